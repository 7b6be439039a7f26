//! Mapping outcomes to the visible commit status, and best-effort pushes.

use std::sync::Arc;

use pull_state::{ProjectPlanStatus, PullStatus};
use tracing::warn;

use crate::collaborators::{CommitState, CommitStatusUpdater};
use crate::domain::{CommandName, EventContext, ProjectResult, ProjectUnit};

/// Three-state mapping, evaluated in order: any error fails, any missing
/// success is pending, else success.
pub fn aggregate_state(num_success: usize, num_errored: usize, num_total: usize) -> CommitState {
    if num_errored > 0 {
        CommitState::Failed
    } else if num_success < num_total {
        CommitState::Pending
    } else {
        CommitState::Success
    }
}

/// e.g. `"2/3 projects planned successfully."`
pub fn count_description(command: CommandName, num_success: usize, num_total: usize) -> String {
    format!(
        "{num_success}/{num_total} projects {} successfully.",
        command.past_tense()
    )
}

/// Description for a combined status without counts.
pub fn combined_description(command: CommandName, state: CommitState) -> String {
    let title = command.title();
    match state {
        CommitState::Pending => format!("{title} in progress..."),
        CommitState::Failed => format!("{title} failed."),
        CommitState::Success => format!("{title} succeeded."),
    }
}

/// `(success, errored, total)` for `command` across the persisted status.
pub fn counts_for(command: CommandName, status: &PullStatus) -> (usize, usize, usize) {
    let (ok, err) = match command {
        CommandName::Plan => (ProjectPlanStatus::Planned, ProjectPlanStatus::ErroredPlan),
        CommandName::Apply => (ProjectPlanStatus::Applied, ProjectPlanStatus::ErroredApply),
        CommandName::PolicyCheck | CommandName::ApprovePolicies | CommandName::Version => (
            ProjectPlanStatus::PassedPolicy,
            ProjectPlanStatus::ErroredPolicy,
        ),
    };
    (
        status.status_count(ok),
        status.status_count(err),
        status.projects.len(),
    )
}

/// Pushes commit statuses. Every call is best-effort: failures are logged and
/// never abort the command.
#[derive(Clone)]
pub struct StatusReporter {
    updater: Arc<dyn CommitStatusUpdater>,
}

impl StatusReporter {
    pub fn new(updater: Arc<dyn CommitStatusUpdater>) -> Self {
        Self { updater }
    }

    async fn combined(&self, ctx: &EventContext, state: CommitState, command: CommandName) {
        if let Err(e) = self
            .updater
            .update_combined(&ctx.base_repo, &ctx.pull, state, command)
            .await
        {
            warn!(
                repo = %ctx.base_repo.full_name,
                pull = ctx.pull.num,
                command = %command,
                state = %state,
                error = %e,
                "unable to update commit status"
            );
        }
    }

    async fn counted(
        &self,
        ctx: &EventContext,
        state: CommitState,
        command: CommandName,
        num_success: usize,
        num_total: usize,
    ) {
        if let Err(e) = self
            .updater
            .update_combined_count(&ctx.base_repo, &ctx.pull, state, command, num_success, num_total)
            .await
        {
            warn!(
                repo = %ctx.base_repo.full_name,
                pull = ctx.pull.num,
                command = %command,
                state = %state,
                error = %e,
                "unable to update commit status"
            );
        }
    }

    pub async fn pending(&self, ctx: &EventContext, command: CommandName) {
        self.combined(ctx, CommitState::Pending, command).await;
    }

    pub async fn failed(&self, ctx: &EventContext, command: CommandName) {
        self.combined(ctx, CommitState::Failed, command).await;
    }

    /// Push the aggregate for `command` computed from the merged status.
    pub async fn from_pull_status(&self, ctx: &EventContext, command: CommandName, status: &PullStatus) {
        let (ok, errored, total) = counts_for(command, status);
        let state = aggregate_state(ok, errored, total);
        self.counted(ctx, state, command, ok, total).await;
    }

    /// success(0/0), pushed when a command found nothing to run.
    pub async fn zero_projects(&self, ctx: &EventContext, command: CommandName) {
        self.counted(ctx, CommitState::Success, command, 0, 0).await;
    }

    pub async fn project_started(&self, unit: &ProjectUnit) {
        let desc = combined_description(unit.command, CommitState::Pending);
        self.project(unit, CommitState::Pending, &desc).await;
    }

    pub async fn project_finished(&self, unit: &ProjectUnit, result: &ProjectResult) {
        let state = if result.is_successful() {
            CommitState::Success
        } else {
            CommitState::Failed
        };
        let desc = combined_description(unit.command, state);
        self.project(unit, state, &desc).await;
    }

    async fn project(&self, unit: &ProjectUnit, state: CommitState, description: &str) {
        if let Err(e) = self.updater.update_project(unit, state, description).await {
            warn!(
                project = %unit.display_name(),
                command = %unit.command,
                error = %e,
                "unable to update project status"
            );
        }
    }
}
