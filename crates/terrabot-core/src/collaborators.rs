//! Capability contracts the engine calls out to.
//!
//! These traits define every external collaborator of the orchestration
//! engine:
//! - `VcsClient`: comments, merges and pull request lookups on the VCS host
//! - `CommitStatusUpdater`: the visible pending/success/failed status
//! - `ProjectUnitBuilder`: expands an event into project units
//! - `ProjectExecutor`: runs one unit to a result
//! - `PreWorkflowHookRunner` / `PostWorkflowHookRunner`: hooks around a command
//! - `PlanCleaner`: removes on-disk plans for a pull request
//!
//! All traits are async and object-safe. Recording fakes live in
//! [`crate::fakes`].

use std::sync::Arc;

use async_trait::async_trait;
use pull_state::PullStatusStore;
use serde::{Deserialize, Serialize};

use crate::domain::{
    CollaboratorResult, CommandName, CommentCommand, EventContext, ProjectResult, ProjectUnit,
    PullRequest, Repo,
};

// ---------------------------------------------------------------------------
// VCS host
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    pub delete_source_branch: bool,
}

#[async_trait]
pub trait VcsClient: Send + Sync {
    /// Post a comment. `command` tags which command produced it, so hosts that
    /// support it can hide superseded comments.
    async fn create_comment(
        &self,
        repo: &Repo,
        pull_num: u64,
        body: &str,
        command: Option<CommandName>,
    ) -> CollaboratorResult<()>;

    async fn merge_pull(&self, pull: &PullRequest, options: MergeOptions)
        -> CollaboratorResult<()>;

    async fn pull_is_mergeable(&self, repo: &Repo, pull: &PullRequest) -> CollaboratorResult<bool>;

    /// Look up a pull request and its head repository.
    async fn fetch_pull(&self, repo: &Repo, pull_num: u64)
        -> CollaboratorResult<(PullRequest, Repo)>;
}

// ---------------------------------------------------------------------------
// Commit status
// ---------------------------------------------------------------------------

/// Three-state visible status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitState {
    Pending,
    Success,
    Failed,
}

impl std::fmt::Display for CommitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CommitState::Pending => "pending",
            CommitState::Success => "success",
            CommitState::Failed => "failed",
        })
    }
}

#[async_trait]
pub trait CommitStatusUpdater: Send + Sync {
    async fn update_combined(
        &self,
        repo: &Repo,
        pull: &PullRequest,
        state: CommitState,
        command: CommandName,
    ) -> CollaboratorResult<()>;

    async fn update_combined_count(
        &self,
        repo: &Repo,
        pull: &PullRequest,
        state: CommitState,
        command: CommandName,
        num_success: usize,
        num_total: usize,
    ) -> CollaboratorResult<()>;

    async fn update_project(
        &self,
        unit: &ProjectUnit,
        state: CommitState,
        description: &str,
    ) -> CollaboratorResult<()>;
}

// ---------------------------------------------------------------------------
// Project units
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ProjectUnitBuilder: Send + Sync {
    /// Units for a pull request open/update. May include policy-check units.
    async fn build_autoplan_units(&self, ctx: &EventContext) -> CollaboratorResult<Vec<ProjectUnit>>;

    /// Units for a plan comment. May include policy-check units.
    async fn build_plan_units(
        &self,
        ctx: &EventContext,
        cmd: &CommentCommand,
    ) -> CollaboratorResult<Vec<ProjectUnit>>;

    async fn build_apply_units(
        &self,
        ctx: &EventContext,
        cmd: &CommentCommand,
    ) -> CollaboratorResult<Vec<ProjectUnit>>;

    async fn build_approve_policies_units(
        &self,
        ctx: &EventContext,
        cmd: &CommentCommand,
    ) -> CollaboratorResult<Vec<ProjectUnit>>;

    async fn build_version_units(
        &self,
        ctx: &EventContext,
        cmd: &CommentCommand,
    ) -> CollaboratorResult<Vec<ProjectUnit>>;
}

/// Runs one unit. Never fails: every problem becomes a failure or error
/// outcome on the returned result.
#[async_trait]
pub trait ProjectExecutor: Send + Sync {
    async fn plan(&self, unit: &ProjectUnit) -> ProjectResult;
    async fn apply(&self, unit: &ProjectUnit) -> ProjectResult;
    async fn policy_check(&self, unit: &ProjectUnit) -> ProjectResult;
    async fn approve_policies(&self, unit: &ProjectUnit) -> ProjectResult;
    async fn version(&self, unit: &ProjectUnit) -> ProjectResult;
}

/// Route a unit to the executor method for `command`.
pub async fn execute_unit(
    executor: &dyn ProjectExecutor,
    command: CommandName,
    unit: &ProjectUnit,
) -> ProjectResult {
    match command {
        CommandName::Plan => executor.plan(unit).await,
        CommandName::Apply => executor.apply(unit).await,
        CommandName::PolicyCheck => executor.policy_check(unit).await,
        CommandName::ApprovePolicies => executor.approve_policies(unit).await,
        CommandName::Version => executor.version(unit).await,
    }
}

// ---------------------------------------------------------------------------
// Hooks and cleanup
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PreWorkflowHookRunner: Send + Sync {
    async fn run_pre_hooks(&self, ctx: &EventContext) -> CollaboratorResult<()>;
}

#[async_trait]
pub trait PostWorkflowHookRunner: Send + Sync {
    async fn run_post_hooks(&self, ctx: &EventContext, command: CommandName)
        -> CollaboratorResult<()>;
}

#[async_trait]
pub trait PlanCleaner: Send + Sync {
    async fn delete_plans(&self, repo: &Repo, pull: &PullRequest) -> CollaboratorResult<()>;
}

/// Every collaborator the engine needs, bundled for construction.
#[derive(Clone)]
pub struct Collaborators {
    pub vcs: Arc<dyn VcsClient>,
    pub status: Arc<dyn CommitStatusUpdater>,
    pub builder: Arc<dyn ProjectUnitBuilder>,
    pub executor: Arc<dyn ProjectExecutor>,
    pub store: Arc<dyn PullStatusStore>,
    pub pre_hooks: Arc<dyn PreWorkflowHookRunner>,
    pub post_hooks: Arc<dyn PostWorkflowHookRunner>,
    pub plan_cleaner: Arc<dyn PlanCleaner>,
}
