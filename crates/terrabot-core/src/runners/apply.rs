use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::{parallel_apply, RunnerDeps};
use crate::domain::{CommandName, CommandResult, CommentCommand, EventContext};
use crate::render;

/// Runs `apply` and, when configured, automerges afterwards.
pub struct ApplyRunner {
    deps: Arc<RunnerDeps>,
}

impl ApplyRunner {
    pub fn new(deps: Arc<RunnerDeps>) -> Self {
        Self { deps }
    }

    #[instrument(skip_all, fields(pull = ctx.pull.num))]
    pub async fn run(&self, ctx: &EventContext, cmd: &CommentCommand) -> CommandResult {
        let deps = &self.deps;

        if deps.settings.config.disable_apply_all && !cmd.is_for_specific_project() {
            info!(pull = ctx.pull.num, "apply without a target is disabled");
            deps.comment(ctx, render::APPLY_ALL_DISABLED_MSG, Some(CommandName::Apply))
                .await;
            return CommandResult::from_failure(render::APPLY_ALL_DISABLED_MSG);
        }

        deps.pending_before_build(ctx, CommandName::Apply).await;

        let mut ctx = ctx.clone();
        ctx.pull_mergeable = match deps.vcs.pull_is_mergeable(&ctx.base_repo, &ctx.pull).await {
            Ok(mergeable) => mergeable,
            Err(e) => {
                warn!(pull = ctx.pull.num, error = %e, "unable to get mergeable status, assuming not mergeable");
                false
            }
        };
        debug!(pull = ctx.pull.num, mergeable = ctx.pull_mergeable, "mergeable status");

        let units = match deps.builder.build_apply_units(&ctx, cmd).await {
            Ok(units) => units,
            Err(e) => {
                warn!(pull = ctx.pull.num, error = %e, "unable to build apply units");
                deps.status.failed(&ctx, CommandName::Apply).await;
                let result = CommandResult::from_error(e.to_string());
                deps.comment_outcome(&ctx, CommandName::Apply, &result).await;
                return result;
            }
        };

        if units.is_empty() && deps.settings.config.silence_no_projects {
            deps.finish_without_projects(&ctx, CommandName::Apply, cmd.is_for_specific_project())
                .await;
            return CommandResult::default();
        }

        let found = !units.is_empty();
        deps.pending_after_build(&ctx, CommandName::Apply, found)
            .await;
        let parallel = parallel_apply(&units);
        let result = deps
            .execute_units(CommandName::Apply, units, parallel)
            .await;

        deps.comment_outcome(&ctx, CommandName::Apply, &result).await;
        let Some(status) = deps.persist(&ctx, &result).await else {
            return result;
        };
        deps.push_counts(&ctx, CommandName::Apply, &status, found)
            .await;

        let repo = &ctx.base_repo.full_name;
        if deps.settings.automerge_enabled(repo) && status.all_applied() {
            deps.automerger
                .try_automerge(&ctx, &status, deps.settings.delete_source_branch(repo))
                .await;
        }
        result
    }
}
