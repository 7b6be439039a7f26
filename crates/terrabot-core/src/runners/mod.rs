//! Per-command runners.
//!
//! Each runner owns the policy for one command: which units to build, when
//! the combined status moves, whether units run in parallel and what follows.
//! Shared plumbing (unit execution, outcome comment, persistence) lives here.

mod apply;
mod approve_policies;
mod plan;
mod policy_check;
mod version;

use std::sync::Arc;

use pull_state::{PullStatus, PullStatusStore};
use tracing::{debug, info, warn};

pub use apply::ApplyRunner;
pub use approve_policies::ApprovePoliciesRunner;
pub use plan::PlanRunner;
pub use policy_check::PolicyCheckRunner;
pub use version::VersionRunner;

use crate::automerge::Automerger;
use crate::collaborators::{execute_unit, PlanCleaner, ProjectExecutor, ProjectUnitBuilder, VcsClient};
use crate::commit_status::StatusReporter;
use crate::config::EngineSettings;
use crate::dispatch::Dispatcher;
use crate::domain::{CommandName, CommandResult, EventContext, ProjectUnit};
use crate::metrics::Metrics;
use crate::obs;
use crate::render;

/// Everything a runner needs, shared by all runners of one engine.
pub struct RunnerDeps {
    pub vcs: Arc<dyn VcsClient>,
    pub builder: Arc<dyn ProjectUnitBuilder>,
    pub executor: Arc<dyn ProjectExecutor>,
    pub store: Arc<dyn PullStatusStore>,
    pub plan_cleaner: Arc<dyn PlanCleaner>,
    pub status: StatusReporter,
    pub dispatcher: Dispatcher,
    pub automerger: Automerger,
    pub settings: EngineSettings,
    pub metrics: Arc<Metrics>,
}

impl RunnerDeps {
    /// Run `units` as `command`, pushing a per-project status around each one
    /// unless the command never reports statuses.
    pub(crate) async fn execute_units(
        &self,
        command: CommandName,
        units: Vec<ProjectUnit>,
        parallel: bool,
    ) -> CommandResult {
        let executor = Arc::clone(&self.executor);
        let status = self.status.clone();
        let metrics = Arc::clone(&self.metrics);
        let report = command.status_command().is_some();

        self.dispatcher
            .run(units, parallel, move |mut unit| {
                let executor = Arc::clone(&executor);
                let status = status.clone();
                let metrics = Arc::clone(&metrics);
                async move {
                    unit.command = command;
                    if report {
                        status.project_started(&unit).await;
                    }
                    let result = execute_unit(executor.as_ref(), command, &unit).await;
                    metrics.inc_units_executed();
                    obs::emit_unit_finished(&result);
                    if report {
                        status.project_finished(&unit, &result).await;
                    }
                    result
                }
            })
            .await
    }

    /// Post the outcome comment. Best-effort.
    pub(crate) async fn comment_outcome(
        &self,
        ctx: &EventContext,
        command: CommandName,
        result: &CommandResult,
    ) {
        let body = render::render_command_result(command, result);
        self.comment(ctx, &body, Some(command)).await;
    }

    pub(crate) async fn comment(&self, ctx: &EventContext, body: &str, command: Option<CommandName>) {
        if let Err(e) = self
            .vcs
            .create_comment(&ctx.base_repo, ctx.pull.num, body, command)
            .await
        {
            warn!(
                repo = %ctx.base_repo.full_name,
                pull = ctx.pull.num,
                error = %e,
                "unable to comment on pull request"
            );
        }
    }

    /// Merge `result` into the persisted status.
    ///
    /// Returns `None` if the store write failed; callers stop there and leave
    /// the commit status as it was.
    pub(crate) async fn persist(&self, ctx: &EventContext, result: &CommandResult) -> Option<PullStatus> {
        match self
            .store
            .update(&ctx.pull.key(), &ctx.pull.head_commit, result.project_statuses())
            .await
        {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(
                    repo = %ctx.base_repo.full_name,
                    pull = ctx.pull.num,
                    error = %e,
                    "unable to update pull status"
                );
                None
            }
        }
    }

    /// Handle a command that matched no projects under `silence_no_projects`.
    ///
    /// Targeted commands restore the status they had before; untargeted ones
    /// report success(0/0) for every command so required checks pass.
    pub(crate) async fn finish_without_projects(
        &self,
        ctx: &EventContext,
        command: CommandName,
        targeted: bool,
    ) {
        info!(pull = ctx.pull.num, command = %command, "no projects to run");
        if self.settings.config.silence_vcs_status_no_plans {
            return;
        }
        if targeted {
            match &ctx.pull_status {
                Some(prior) => self.status.from_pull_status(ctx, command, prior).await,
                None => self.status.zero_projects(ctx, command).await,
            }
        } else {
            self.zero_all(ctx).await;
        }
    }

    /// Pending before the build. `silence_vcs_status_no_plans` defers it to
    /// [`Self::pending_after_build`] so an empty selection leaves no status.
    pub(crate) async fn pending_before_build(&self, ctx: &EventContext, command: CommandName) {
        if !self.settings.config.silence_vcs_status_no_plans {
            self.status.pending(ctx, command).await;
        }
    }

    pub(crate) async fn pending_after_build(
        &self,
        ctx: &EventContext,
        command: CommandName,
        found: bool,
    ) {
        if found && self.settings.config.silence_vcs_status_no_plans {
            self.status.pending(ctx, command).await;
        }
    }

    /// Push the merged count for `command`, skipped when nothing ran and
    /// empty statuses are silenced.
    pub(crate) async fn push_counts(
        &self,
        ctx: &EventContext,
        command: CommandName,
        status: &PullStatus,
        found: bool,
    ) {
        if !found && self.settings.config.silence_vcs_status_no_plans {
            debug!(pull = ctx.pull.num, command = %command, "no projects ran, leaving status alone");
            return;
        }
        self.status.from_pull_status(ctx, command, status).await;
    }

    /// success(0/0) for plan, policy check and apply.
    pub(crate) async fn zero_all(&self, ctx: &EventContext) {
        for command in [CommandName::Plan, CommandName::PolicyCheck, CommandName::Apply] {
            self.status.zero_projects(ctx, command).await;
        }
    }
}

/// Split builder output into plan units and the policy-check units to run
/// after a successful plan.
pub(crate) fn partition(units: Vec<ProjectUnit>) -> (Vec<ProjectUnit>, Vec<ProjectUnit>) {
    units
        .into_iter()
        .partition(|u| u.command != CommandName::PolicyCheck)
}

/// The first unit's flag governs the whole batch.
pub(crate) fn parallel_plan(units: &[ProjectUnit]) -> bool {
    units.first().is_some_and(|u| u.parallel_plan)
}

pub(crate) fn parallel_apply(units: &[ProjectUnit]) -> bool {
    units.first().is_some_and(|u| u.parallel_apply)
}
