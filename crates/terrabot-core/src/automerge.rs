//! Merging a pull request once every project is applied.

use std::sync::Arc;

use pull_state::PullStatus;
use tracing::{debug, warn};

use crate::collaborators::{MergeOptions, VcsClient};
use crate::domain::EventContext;
use crate::metrics::Metrics;
use crate::obs;
use crate::render;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutomergeOutcome {
    /// Some project isn't applied yet.
    Skipped,
    Merged,
    Failed(String),
}

pub struct Automerger {
    vcs: Arc<dyn VcsClient>,
    metrics: Arc<Metrics>,
}

impl Automerger {
    pub fn new(vcs: Arc<dyn VcsClient>, metrics: Arc<Metrics>) -> Self {
        Self { vcs, metrics }
    }

    /// Merge the pull if every persisted project status is applied.
    ///
    /// Posts an informational comment first; a merge failure is reported in a
    /// second comment and not retried.
    pub async fn try_automerge(
        &self,
        ctx: &EventContext,
        status: &PullStatus,
        delete_source_branch: bool,
    ) -> AutomergeOutcome {
        if !status.all_applied() {
            debug!(pull = ctx.pull.num, "not all projects applied, skipping automerge");
            return AutomergeOutcome::Skipped;
        }

        self.comment(ctx, render::AUTOMERGE_MSG).await;

        let options = MergeOptions {
            delete_source_branch,
        };
        match self.vcs.merge_pull(&ctx.pull, options).await {
            Ok(()) => {
                self.metrics.inc_automerges();
                obs::emit_automerge(&ctx.base_repo.full_name, ctx.pull.num, true);
                AutomergeOutcome::Merged
            }
            Err(e) => {
                let msg = e.to_string();
                warn!(pull = ctx.pull.num, error = %msg, "automerge failed");
                obs::emit_automerge(&ctx.base_repo.full_name, ctx.pull.num, false);
                self.comment(ctx, &render::automerge_failed_msg(&msg)).await;
                AutomergeOutcome::Failed(msg)
            }
        }
    }

    async fn comment(&self, ctx: &EventContext, body: &str) {
        if let Err(e) = self
            .vcs
            .create_comment(&ctx.base_repo, ctx.pull.num, body, None)
            .await
        {
            warn!(pull = ctx.pull.num, error = %e, "unable to comment on pull request");
        }
    }
}
