use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::RunnerDeps;
use crate::domain::{CommandName, CommandResult, CommentCommand, EventContext};
use crate::render;

/// Approves failing policy checks. Only configured approvers may run it, and
/// approval covers every selected project or none.
pub struct ApprovePoliciesRunner {
    deps: Arc<RunnerDeps>,
}

impl ApprovePoliciesRunner {
    pub fn new(deps: Arc<RunnerDeps>) -> Self {
        Self { deps }
    }

    #[instrument(skip_all, fields(pull = ctx.pull.num, user = %ctx.user.username))]
    pub async fn run(&self, ctx: &EventContext, cmd: &CommentCommand) -> CommandResult {
        let deps = &self.deps;
        let approvers = &deps.settings.config.policy_approvers;

        if !approvers.iter().any(|a| a == &ctx.user.username) {
            info!(user = %ctx.user.username, "user is not a policy approver");
            let result = CommandResult::from_error(render::approvers_required_msg(approvers));
            deps.comment_outcome(ctx, CommandName::ApprovePolicies, &result)
                .await;
            return result;
        }

        deps.pending_before_build(ctx, CommandName::PolicyCheck).await;

        let units = match deps.builder.build_approve_policies_units(ctx, cmd).await {
            Ok(units) => units,
            Err(e) => {
                warn!(pull = ctx.pull.num, error = %e, "unable to build approve policies units");
                deps.status.failed(ctx, CommandName::PolicyCheck).await;
                let result = CommandResult::from_error(e.to_string());
                deps.comment_outcome(ctx, CommandName::ApprovePolicies, &result)
                    .await;
                return result;
            }
        };

        if units.is_empty() && deps.settings.config.silence_no_projects {
            deps.finish_without_projects(ctx, CommandName::PolicyCheck, cmd.is_for_specific_project())
                .await;
            return CommandResult::default();
        }

        let found = !units.is_empty();
        deps.pending_after_build(ctx, CommandName::PolicyCheck, found)
            .await;
        let result = deps
            .execute_units(CommandName::ApprovePolicies, units, false)
            .await;

        deps.comment_outcome(ctx, CommandName::ApprovePolicies, &result)
            .await;
        if let Some(status) = deps.persist(ctx, &result).await {
            deps.push_counts(ctx, CommandName::PolicyCheck, &status, found)
                .await;
        }
        result
    }
}
