use std::sync::Arc;

use tracing::{instrument, warn};

use super::{parallel_plan, RunnerDeps};
use crate::domain::{CommandName, CommandResult, CommentCommand, EventContext};

/// Reports tool versions per project. Touches neither commit statuses nor
/// the persisted pull status.
pub struct VersionRunner {
    deps: Arc<RunnerDeps>,
}

impl VersionRunner {
    pub fn new(deps: Arc<RunnerDeps>) -> Self {
        Self { deps }
    }

    #[instrument(skip_all, fields(pull = ctx.pull.num))]
    pub async fn run(&self, ctx: &EventContext, cmd: &CommentCommand) -> CommandResult {
        let deps = &self.deps;
        let units = match deps.builder.build_version_units(ctx, cmd).await {
            Ok(units) => units,
            Err(e) => {
                warn!(pull = ctx.pull.num, error = %e, "unable to build version units");
                let result = CommandResult::from_error(e.to_string());
                deps.comment_outcome(ctx, CommandName::Version, &result)
                    .await;
                return result;
            }
        };

        if units.is_empty() && deps.settings.config.silence_no_projects {
            return CommandResult::default();
        }

        let parallel = parallel_plan(&units);
        let result = deps
            .execute_units(CommandName::Version, units, parallel)
            .await;
        deps.comment_outcome(ctx, CommandName::Version, &result)
            .await;
        result
    }
}
