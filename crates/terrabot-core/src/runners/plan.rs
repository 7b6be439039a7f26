use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::{parallel_plan, partition, PolicyCheckRunner, RunnerDeps};
use crate::domain::{CommandName, CommandResult, CommentCommand, EventContext, ProjectUnit};

/// Runs `plan`, both for autoplan and for comments, then policy checks.
pub struct PlanRunner {
    deps: Arc<RunnerDeps>,
    policy_check: PolicyCheckRunner,
}

impl PlanRunner {
    pub fn new(deps: Arc<RunnerDeps>) -> Self {
        Self {
            policy_check: PolicyCheckRunner::new(Arc::clone(&deps)),
            deps,
        }
    }

    /// Plan every project touched by a pull request open/update.
    ///
    /// No comment is posted when there is nothing to plan, and the status is
    /// only moved to pending once there is.
    #[instrument(skip_all, fields(pull = ctx.pull.num))]
    pub async fn run_autoplan(&self, ctx: &EventContext) -> CommandResult {
        let deps = &self.deps;
        let units = match deps.builder.build_autoplan_units(ctx).await {
            Ok(units) => units,
            Err(e) => return self.builder_failed(ctx, e.to_string()).await,
        };

        let (plan_units, policy_units) = partition(units);
        if plan_units.is_empty() {
            info!(pull = ctx.pull.num, "no projects to autoplan");
            if !deps.settings.config.silence_vcs_status_no_plans {
                deps.zero_all(ctx).await;
            }
            return CommandResult::default();
        }

        deps.status.pending(ctx, CommandName::Plan).await;
        self.plan_and_follow(ctx, plan_units, policy_units).await
    }

    /// Plan the projects a `plan` comment selects.
    #[instrument(skip_all, fields(pull = ctx.pull.num))]
    pub async fn run(&self, ctx: &EventContext, cmd: &CommentCommand) -> CommandResult {
        let deps = &self.deps;
        deps.pending_before_build(ctx, CommandName::Plan).await;

        let units = match deps.builder.build_plan_units(ctx, cmd).await {
            Ok(units) => units,
            Err(e) => return self.builder_failed(ctx, e.to_string()).await,
        };

        let (plan_units, policy_units) = partition(units);
        if plan_units.is_empty() && deps.settings.config.silence_no_projects {
            deps.finish_without_projects(ctx, CommandName::Plan, cmd.is_for_specific_project())
                .await;
            return CommandResult::default();
        }

        deps.pending_after_build(ctx, CommandName::Plan, !plan_units.is_empty())
            .await;
        self.plan_and_follow(ctx, plan_units, policy_units).await
    }

    async fn builder_failed(&self, ctx: &EventContext, err: String) -> CommandResult {
        warn!(pull = ctx.pull.num, error = %err, "unable to build plan units");
        self.deps.status.failed(ctx, CommandName::Plan).await;
        let result = CommandResult::from_error(err);
        self.deps
            .comment_outcome(ctx, CommandName::Plan, &result)
            .await;
        result
    }

    async fn plan_and_follow(
        &self,
        ctx: &EventContext,
        plan_units: Vec<ProjectUnit>,
        policy_units: Vec<ProjectUnit>,
    ) -> CommandResult {
        let deps = &self.deps;
        let found = !plan_units.is_empty();
        let parallel = parallel_plan(&plan_units);
        let mut result = deps
            .execute_units(CommandName::Plan, plan_units, parallel)
            .await;

        // Automerge needs every plan to succeed; don't leave partial plans
        // around for someone to apply.
        if result.has_errors() && deps.settings.automerge_enabled(&ctx.base_repo.full_name) {
            info!(pull = ctx.pull.num, "deleting plans because automerge is enabled");
            match deps.plan_cleaner.delete_plans(&ctx.base_repo, &ctx.pull).await {
                Ok(()) => result.plans_deleted = true,
                Err(e) => warn!(pull = ctx.pull.num, error = %e, "unable to delete plans"),
            }
        }

        deps.comment_outcome(ctx, CommandName::Plan, &result).await;

        let Some(status) = deps.persist(ctx, &result).await else {
            return result;
        };
        deps.push_counts(ctx, CommandName::Plan, &status, found)
            .await;

        if !result.has_errors() && !result.plans_deleted {
            let mut ctx = ctx.clone();
            ctx.pull_status = Some(status);
            self.policy_check.run_units(&ctx, policy_units).await;
        }
        result
    }
}
