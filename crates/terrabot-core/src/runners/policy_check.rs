use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::{parallel_plan, partition, RunnerDeps};
use crate::domain::{CommandName, CommandResult, CommentCommand, EventContext, ProjectUnit};

/// Runs policy checks against existing plans.
pub struct PolicyCheckRunner {
    deps: Arc<RunnerDeps>,
}

impl PolicyCheckRunner {
    pub fn new(deps: Arc<RunnerDeps>) -> Self {
        Self { deps }
    }

    /// Policy check the projects a comment selects, using the policy-check
    /// units the plan builder produces for them.
    #[instrument(skip_all, fields(pull = ctx.pull.num))]
    pub async fn run(&self, ctx: &EventContext, cmd: &CommentCommand) -> CommandResult {
        let units = match self.deps.builder.build_plan_units(ctx, cmd).await {
            Ok(units) => units,
            Err(e) => {
                warn!(pull = ctx.pull.num, error = %e, "unable to build policy check units");
                self.deps.status.failed(ctx, CommandName::PolicyCheck).await;
                let result = CommandResult::from_error(e.to_string());
                self.deps
                    .comment_outcome(ctx, CommandName::PolicyCheck, &result)
                    .await;
                return result;
            }
        };
        let (_, policy_units) = partition(units);
        self.run_units(ctx, policy_units).await
    }

    /// Check `units`. With nothing to check, success(0/0) is reported unless
    /// empty statuses are silenced.
    pub async fn run_units(&self, ctx: &EventContext, units: Vec<ProjectUnit>) -> CommandResult {
        let deps = &self.deps;
        if units.is_empty() {
            info!(pull = ctx.pull.num, "no policy checks to run");
            if !deps.settings.config.silence_vcs_status_no_plans {
                deps.status
                    .zero_projects(ctx, CommandName::PolicyCheck)
                    .await;
            }
            return CommandResult::default();
        }

        deps.status.pending(ctx, CommandName::PolicyCheck).await;
        let parallel = parallel_plan(&units);
        let result = deps
            .execute_units(CommandName::PolicyCheck, units, parallel)
            .await;

        deps.comment_outcome(ctx, CommandName::PolicyCheck, &result)
            .await;
        if let Some(status) = deps.persist(ctx, &result).await {
            deps.status
                .from_pull_status(ctx, CommandName::PolicyCheck, &status)
                .await;
        }
        result
    }
}
