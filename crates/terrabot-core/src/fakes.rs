//! In-memory fakes for every collaborator trait (testing only)
//!
//! Each fake records what the engine asked of it and can be scripted to fail,
//! so tests can assert on side effects without a VCS host or Terraform.
//! [`Harness`] bundles one of each with a `MemoryPullStatusStore`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pull_state::fakes::MemoryPullStatusStore;

use crate::collaborators::*;
use crate::domain::*;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Sample values
// ---------------------------------------------------------------------------

pub fn repo() -> Repo {
    Repo::new(VcsHost::GitHub, "acme", "infra")
}

pub fn pull_request() -> PullRequest {
    PullRequest {
        num: 1,
        head_commit: "abc123".to_string(),
        head_branch: "feature".to_string(),
        base_branch: "main".to_string(),
        author: "dev".to_string(),
        state: PullState::Open,
        base_repo: repo(),
    }
}

pub fn event_context() -> EventContext {
    EventContext {
        base_repo: repo(),
        head_repo: repo(),
        pull: pull_request(),
        user: User::new("dev"),
        trigger: Trigger::Comment,
        trigger_timestamp: Utc::now(),
        pull_status: None,
        pull_mergeable: false,
    }
}

/// A comment event carrying `command`, timestamped now.
pub fn comment_event(command: CommentCommand) -> CommandEvent {
    CommandEvent {
        base_repo: repo(),
        head_repo: Some(repo()),
        pull: Some(pull_request()),
        user: User::new("dev"),
        pull_num: 1,
        command: Some(command),
        timestamp: Utc::now(),
    }
}

/// A pull request open/update event, timestamped now.
pub fn autoplan_event() -> CommandEvent {
    CommandEvent {
        command: None,
        ..comment_event(CommentCommand::new(CommandName::Plan))
    }
}

// ---------------------------------------------------------------------------
// RecordingVcs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedComment {
    pub repo: String,
    pub pull_num: u64,
    pub body: String,
    pub command: Option<CommandName>,
}

#[derive(Debug)]
pub struct RecordingVcs {
    comments: Mutex<Vec<PostedComment>>,
    merges: Mutex<Vec<(u64, MergeOptions)>>,
    fetches: AtomicUsize,
    fail_comments: AtomicBool,
    fail_merges: AtomicBool,
    fail_mergeable: AtomicBool,
    mergeable: AtomicBool,
    fetched: Mutex<Option<(PullRequest, Repo)>>,
}

impl Default for RecordingVcs {
    fn default() -> Self {
        Self {
            comments: Mutex::default(),
            merges: Mutex::default(),
            fetches: AtomicUsize::new(0),
            fail_comments: AtomicBool::new(false),
            fail_merges: AtomicBool::new(false),
            fail_mergeable: AtomicBool::new(false),
            mergeable: AtomicBool::new(true),
            fetched: Mutex::new(Some((pull_request(), repo()))),
        }
    }
}

impl RecordingVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn comments(&self) -> Vec<PostedComment> {
        lock(&self.comments).clone()
    }

    pub fn merges(&self) -> Vec<(u64, MergeOptions)> {
        lock(&self.merges).clone()
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn fail_comments(&self, fail: bool) {
        self.fail_comments.store(fail, Ordering::SeqCst);
    }

    pub fn fail_merges(&self, fail: bool) {
        self.fail_merges.store(fail, Ordering::SeqCst);
    }

    pub fn fail_mergeable(&self, fail: bool) {
        self.fail_mergeable.store(fail, Ordering::SeqCst);
    }

    pub fn set_mergeable(&self, mergeable: bool) {
        self.mergeable.store(mergeable, Ordering::SeqCst);
    }

    /// What `fetch_pull` returns; `None` makes it fail.
    pub fn set_fetched(&self, fetched: Option<(PullRequest, Repo)>) {
        *lock(&self.fetched) = fetched;
    }
}

#[async_trait]
impl VcsClient for RecordingVcs {
    async fn create_comment(
        &self,
        repo: &Repo,
        pull_num: u64,
        body: &str,
        command: Option<CommandName>,
    ) -> CollaboratorResult<()> {
        if self.fail_comments.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Vcs("injected comment failure".to_string()));
        }
        lock(&self.comments).push(PostedComment {
            repo: repo.full_name.clone(),
            pull_num,
            body: body.to_string(),
            command,
        });
        Ok(())
    }

    async fn merge_pull(&self, pull: &PullRequest, options: MergeOptions) -> CollaboratorResult<()> {
        if self.fail_merges.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Vcs("merge conflict".to_string()));
        }
        lock(&self.merges).push((pull.num, options));
        Ok(())
    }

    async fn pull_is_mergeable(&self, _repo: &Repo, _pull: &PullRequest) -> CollaboratorResult<bool> {
        if self.fail_mergeable.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Vcs("injected mergeable failure".to_string()));
        }
        Ok(self.mergeable.load(Ordering::SeqCst))
    }

    async fn fetch_pull(&self, _repo: &Repo, _pull_num: u64) -> CollaboratorResult<(PullRequest, Repo)> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        lock(&self.fetched)
            .clone()
            .ok_or_else(|| CollaboratorError::Vcs("pull not found".to_string()))
    }
}

// ---------------------------------------------------------------------------
// RecordingStatusUpdater
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusCall {
    Combined {
        state: CommitState,
        command: CommandName,
    },
    Count {
        state: CommitState,
        command: CommandName,
        num_success: usize,
        num_total: usize,
    },
    Project {
        project: String,
        command: CommandName,
        state: CommitState,
    },
}

#[derive(Debug, Default)]
pub struct RecordingStatusUpdater {
    calls: Mutex<Vec<StatusCall>>,
    fail: AtomicBool,
}

impl RecordingStatusUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<StatusCall> {
        lock(&self.calls).clone()
    }

    /// Combined and counted calls only, without per-project ones.
    pub fn combined_calls(&self) -> Vec<StatusCall> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, StatusCall::Project { .. }))
            .collect()
    }

    pub fn project_calls(&self) -> Vec<StatusCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, StatusCall::Project { .. }))
            .collect()
    }

    /// Last state pushed for `command`, combined or counted.
    pub fn last_state(&self, command: CommandName) -> Option<CommitState> {
        self.combined_calls()
            .into_iter()
            .rev()
            .find_map(|call| match call {
                StatusCall::Combined { state, command: c }
                | StatusCall::Count {
                    state, command: c, ..
                } if c == command => Some(state),
                _ => None,
            })
    }

    /// Record calls but report every push as failed.
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: StatusCall) -> CollaboratorResult<()> {
        lock(&self.calls).push(call);
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Vcs("injected status failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CommitStatusUpdater for RecordingStatusUpdater {
    async fn update_combined(
        &self,
        _repo: &Repo,
        _pull: &PullRequest,
        state: CommitState,
        command: CommandName,
    ) -> CollaboratorResult<()> {
        self.record(StatusCall::Combined { state, command })
    }

    async fn update_combined_count(
        &self,
        _repo: &Repo,
        _pull: &PullRequest,
        state: CommitState,
        command: CommandName,
        num_success: usize,
        num_total: usize,
    ) -> CollaboratorResult<()> {
        self.record(StatusCall::Count {
            state,
            command,
            num_success,
            num_total,
        })
    }

    async fn update_project(
        &self,
        unit: &ProjectUnit,
        state: CommitState,
        _description: &str,
    ) -> CollaboratorResult<()> {
        self.record(StatusCall::Project {
            project: unit.display_name(),
            command: unit.command,
            state,
        })
    }
}

// ---------------------------------------------------------------------------
// StaticUnitBuilder
// ---------------------------------------------------------------------------

/// Which builder method a script applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildKind {
    Autoplan,
    Plan,
    Apply,
    ApprovePolicies,
    Version,
}

impl BuildKind {
    fn default_command(self) -> CommandName {
        match self {
            BuildKind::Autoplan | BuildKind::Plan => CommandName::Plan,
            BuildKind::Apply => CommandName::Apply,
            BuildKind::ApprovePolicies => CommandName::ApprovePolicies,
            BuildKind::Version => CommandName::Version,
        }
    }
}

/// Shape of one unit the builder should produce.
#[derive(Debug, Clone)]
pub struct UnitSpec {
    pub dir: String,
    pub workspace: String,
    pub name: String,
    pub command: Option<CommandName>,
    pub parallel: bool,
}

impl UnitSpec {
    pub fn dir(dir: &str) -> Self {
        Self {
            dir: dir.to_string(),
            workspace: "default".to_string(),
            name: String::new(),
            command: None,
            parallel: false,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    /// Emit this unit as a policy-check unit.
    pub fn policy_check(mut self) -> Self {
        self.command = Some(CommandName::PolicyCheck);
        self
    }
}

#[derive(Debug, Default)]
pub struct StaticUnitBuilder {
    scripts: Mutex<HashMap<BuildKind, std::result::Result<Vec<UnitSpec>, String>>>,
    seen: Mutex<Vec<(BuildKind, EventContext)>>,
}

impl StaticUnitBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_units(&self, kind: BuildKind, units: Vec<UnitSpec>) {
        lock(&self.scripts).insert(kind, Ok(units));
    }

    pub fn fail(&self, kind: BuildKind, msg: &str) {
        lock(&self.scripts).insert(kind, Err(msg.to_string()));
    }

    /// Contexts passed to each build call, in call order.
    pub fn seen(&self) -> Vec<(BuildKind, EventContext)> {
        lock(&self.seen).clone()
    }

    fn build(
        &self,
        kind: BuildKind,
        ctx: &EventContext,
        cmd: Option<&CommentCommand>,
    ) -> CollaboratorResult<Vec<ProjectUnit>> {
        lock(&self.seen).push((kind, ctx.clone()));
        let script = lock(&self.scripts)
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()));
        let specs = script.map_err(CollaboratorError::Builder)?;

        Ok(specs
            .into_iter()
            .map(|spec| {
                let command = spec.command.unwrap_or_else(|| kind.default_command());
                let mut unit = ProjectUnit::new(command, ctx, spec.dir, spec.workspace)
                    .named(spec.name)
                    .with_parallel(spec.parallel, spec.parallel);
                if let Some(cmd) = cmd {
                    unit.force_apply = cmd.force_apply;
                    unit.flags = cmd.flags.clone();
                }
                unit
            })
            .collect())
    }
}

#[async_trait]
impl ProjectUnitBuilder for StaticUnitBuilder {
    async fn build_autoplan_units(&self, ctx: &EventContext) -> CollaboratorResult<Vec<ProjectUnit>> {
        self.build(BuildKind::Autoplan, ctx, None)
    }

    async fn build_plan_units(
        &self,
        ctx: &EventContext,
        cmd: &CommentCommand,
    ) -> CollaboratorResult<Vec<ProjectUnit>> {
        self.build(BuildKind::Plan, ctx, Some(cmd))
    }

    async fn build_apply_units(
        &self,
        ctx: &EventContext,
        cmd: &CommentCommand,
    ) -> CollaboratorResult<Vec<ProjectUnit>> {
        self.build(BuildKind::Apply, ctx, Some(cmd))
    }

    async fn build_approve_policies_units(
        &self,
        ctx: &EventContext,
        cmd: &CommentCommand,
    ) -> CollaboratorResult<Vec<ProjectUnit>> {
        self.build(BuildKind::ApprovePolicies, ctx, Some(cmd))
    }

    async fn build_version_units(
        &self,
        ctx: &EventContext,
        cmd: &CommentCommand,
    ) -> CollaboratorResult<Vec<ProjectUnit>> {
        self.build(BuildKind::Version, ctx, Some(cmd))
    }
}

// ---------------------------------------------------------------------------
// ScriptedExecutor
// ---------------------------------------------------------------------------

/// Non-default behaviour for units in one directory.
#[derive(Debug, Clone)]
pub enum Script {
    Fail(String),
    Error(String),
    Panic,
    Delay(Duration),
}

#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<(CommandName, String)>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, dir: &str, script: Script) {
        lock(&self.scripts).insert(dir.to_string(), script);
    }

    /// `(command, dir)` for every executed unit, in start order.
    pub fn calls(&self) -> Vec<(CommandName, String)> {
        lock(&self.calls).clone()
    }

    /// Highest number of units seen running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn run(&self, command: CommandName, unit: &ProjectUnit) -> ProjectResult {
        lock(&self.calls).push((command, unit.repo_rel_dir.clone()));
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let script = lock(&self.scripts).get(&unit.repo_rel_dir).cloned();
        let result = match script {
            Some(Script::Fail(msg)) => ProjectResult::failure(unit, msg),
            Some(Script::Error(msg)) => ProjectResult::error(unit, msg),
            Some(Script::Panic) => {
                self.running.fetch_sub(1, Ordering::SeqCst);
                panic!("scripted panic in {}", unit.repo_rel_dir);
            }
            Some(Script::Delay(d)) => {
                tokio::time::sleep(d).await;
                ProjectResult::success(unit, success_for(command))
            }
            None => ProjectResult::success(unit, success_for(command)),
        };
        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn success_for(command: CommandName) -> ProjectSuccess {
    match command {
        CommandName::Plan => ProjectSuccess::Plan {
            summary: "Plan: 1 to add, 0 to change, 0 to destroy.".to_string(),
            has_changes: true,
        },
        CommandName::Apply => ProjectSuccess::Apply {
            output: "Apply complete!".to_string(),
        },
        CommandName::PolicyCheck => ProjectSuccess::PolicyCheck {
            output: "0 failures".to_string(),
        },
        CommandName::ApprovePolicies => ProjectSuccess::ApprovePolicies,
        CommandName::Version => ProjectSuccess::Version {
            output: "Terraform v1.6.0".to_string(),
        },
    }
}

#[async_trait]
impl ProjectExecutor for ScriptedExecutor {
    async fn plan(&self, unit: &ProjectUnit) -> ProjectResult {
        self.run(CommandName::Plan, unit).await
    }

    async fn apply(&self, unit: &ProjectUnit) -> ProjectResult {
        self.run(CommandName::Apply, unit).await
    }

    async fn policy_check(&self, unit: &ProjectUnit) -> ProjectResult {
        self.run(CommandName::PolicyCheck, unit).await
    }

    async fn approve_policies(&self, unit: &ProjectUnit) -> ProjectResult {
        self.run(CommandName::ApprovePolicies, unit).await
    }

    async fn version(&self, unit: &ProjectUnit) -> ProjectResult {
        self.run(CommandName::Version, unit).await
    }
}

// ---------------------------------------------------------------------------
// RecordingHooks / RecordingPlanCleaner
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RecordingHooks {
    pre_runs: AtomicUsize,
    post_runs: Mutex<Vec<CommandName>>,
    fail_pre: AtomicBool,
    fail_post: AtomicBool,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pre_runs(&self) -> usize {
        self.pre_runs.load(Ordering::SeqCst)
    }

    pub fn post_runs(&self) -> Vec<CommandName> {
        lock(&self.post_runs).clone()
    }

    pub fn fail_pre(&self, fail: bool) {
        self.fail_pre.store(fail, Ordering::SeqCst);
    }

    pub fn fail_post(&self, fail: bool) {
        self.fail_post.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PreWorkflowHookRunner for RecordingHooks {
    async fn run_pre_hooks(&self, _ctx: &EventContext) -> CollaboratorResult<()> {
        self.pre_runs.fetch_add(1, Ordering::SeqCst);
        if self.fail_pre.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Hook("pre hook exited 1".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PostWorkflowHookRunner for RecordingHooks {
    async fn run_post_hooks(&self, _ctx: &EventContext, command: CommandName) -> CollaboratorResult<()> {
        lock(&self.post_runs).push(command);
        if self.fail_post.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Hook("post hook exited 1".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingPlanCleaner {
    deleted: Mutex<Vec<u64>>,
    fail: AtomicBool,
}

impl RecordingPlanCleaner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pull numbers whose plans were deleted.
    pub fn deleted(&self) -> Vec<u64> {
        lock(&self.deleted).clone()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PlanCleaner for RecordingPlanCleaner {
    async fn delete_plans(&self, _repo: &Repo, pull: &PullRequest) -> CollaboratorResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Cleanup("injected cleanup failure".to_string()));
        }
        lock(&self.deleted).push(pull.num);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// One of every fake, sharing nothing with any other harness.
#[derive(Clone, Default)]
pub struct Harness {
    pub vcs: Arc<RecordingVcs>,
    pub status: Arc<RecordingStatusUpdater>,
    pub builder: Arc<StaticUnitBuilder>,
    pub executor: Arc<ScriptedExecutor>,
    pub store: Arc<MemoryPullStatusStore>,
    pub hooks: Arc<RecordingHooks>,
    pub cleaner: Arc<RecordingPlanCleaner>,
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            vcs: self.vcs.clone(),
            status: self.status.clone(),
            builder: self.builder.clone(),
            executor: self.executor.clone(),
            store: self.store.clone(),
            pre_hooks: self.hooks.clone(),
            post_hooks: self.hooks.clone(),
            plan_cleaner: self.cleaner.clone(),
        }
    }
}
