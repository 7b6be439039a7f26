//! Entry point for every pull request event.
//!
//! [`CommandRunner::run`] admits the event through the drain gate, resolves
//! the pull request, validates it, drops stale events, runs pre-workflow
//! hooks and hands off to the runner for the command. Nothing inside can
//! panic past it.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, info, warn, Instrument};

use crate::automerge::Automerger;
use crate::collaborators::{Collaborators, PostWorkflowHookRunner, PreWorkflowHookRunner};
use crate::commit_status::StatusReporter;
use crate::config::{EngineConfig, EngineSettings};
use crate::dispatch::Dispatcher;
use crate::domain::{
    CommandEvent, CommandName, CommandResult, EngineError, EventContext, PullRequest, PullState,
    Repo, Result,
};
use crate::drain::Drainer;
use crate::metrics::Metrics;
use crate::obs;
use crate::render;
use crate::runners::{
    ApplyRunner, ApprovePoliciesRunner, PlanRunner, PolicyCheckRunner, RunnerDeps, VersionRunner,
};
use crate::staleness;

/// What happened to one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Shutdown in progress; the user was asked to retry.
    Draining,
    /// The command itself was malformed or the pull couldn't be resolved.
    Error(String),
    /// Fork, closed or branch checks failed.
    Rejected(String),
    /// A newer status was already persisted.
    Stale,
    AutoplanDisabled,
    HookFailed(String),
    Completed {
        command: CommandName,
        result: CommandResult,
    },
    /// A closed pull request's state was cleaned up.
    Closed,
    Panicked(String),
}

pub struct CommandRunner {
    deps: Arc<RunnerDeps>,
    pre_hooks: Arc<dyn PreWorkflowHookRunner>,
    post_hooks: Arc<dyn PostWorkflowHookRunner>,
    drainer: Arc<Drainer>,
    plan: PlanRunner,
    apply: ApplyRunner,
    policy_check: PolicyCheckRunner,
    approve_policies: ApprovePoliciesRunner,
    version: VersionRunner,
}

impl CommandRunner {
    /// Validate `config` and wire every runner.
    pub fn new(
        collaborators: Collaborators,
        config: EngineConfig,
        drainer: Arc<Drainer>,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let settings = EngineSettings::new(config)?;
        let Collaborators {
            vcs,
            status,
            builder,
            executor,
            store,
            pre_hooks,
            post_hooks,
            plan_cleaner,
        } = collaborators;

        let deps = Arc::new(RunnerDeps {
            automerger: Automerger::new(Arc::clone(&vcs), Arc::clone(&metrics)),
            dispatcher: Dispatcher::new(settings.config.parallel_pool_size, Arc::clone(&metrics)),
            status: StatusReporter::new(status),
            vcs,
            builder,
            executor,
            store,
            plan_cleaner,
            settings,
            metrics,
        });

        Ok(Self {
            plan: PlanRunner::new(Arc::clone(&deps)),
            apply: ApplyRunner::new(Arc::clone(&deps)),
            policy_check: PolicyCheckRunner::new(Arc::clone(&deps)),
            approve_policies: ApprovePoliciesRunner::new(Arc::clone(&deps)),
            version: VersionRunner::new(Arc::clone(&deps)),
            deps,
            pre_hooks,
            post_hooks,
            drainer,
        })
    }

    pub fn drainer(&self) -> &Arc<Drainer> {
        &self.drainer
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.deps.metrics
    }

    /// Process one autoplan or comment event to completion.
    pub async fn run(&self, event: CommandEvent) -> EventOutcome {
        let Some(_op) = self.drainer.admit() else {
            self.deps.metrics.inc_commands_rejected_draining();
            info!(repo = %event.base_repo.full_name, pull = event.pull_num, "rejecting event, shutting down");
            self.comment(&event.base_repo, event.pull_num, render::SHUTDOWN_MSG, None)
                .await;
            return EventOutcome::Draining;
        };

        let repo = event.base_repo.clone();
        let pull_num = event.pull_num;
        let label = event
            .command
            .as_ref()
            .map_or("autoplan", |c| c.name.as_str());
        let span = obs::command_span(&repo.full_name, pull_num, label);

        match AssertUnwindSafe(self.run_admitted(event).instrument(span))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let detail = panic_detail(panic.as_ref());
                self.deps.metrics.inc_event_panics();
                obs::emit_panic_recovered("event", &detail);
                error!(repo = %repo.full_name, pull = pull_num, command = label, panic = %detail, "recovered from panic");
                self.comment(&repo, pull_num, &render::panic_msg(label, &detail), None)
                    .await;
                EventOutcome::Panicked(detail)
            }
        }
    }

    /// Forget a closed pull request: drop its persisted status and plans.
    pub async fn run_pull_closed(&self, repo: &Repo, pull: &PullRequest) -> EventOutcome {
        let Some(_op) = self.drainer.admit() else {
            self.deps.metrics.inc_commands_rejected_draining();
            return EventOutcome::Draining;
        };

        if let Err(e) = self.deps.store.delete(&pull.key()).await {
            warn!(repo = %repo.full_name, pull = pull.num, error = %e, "unable to delete pull status");
        }
        if let Err(e) = self.deps.plan_cleaner.delete_plans(repo, pull).await {
            warn!(repo = %repo.full_name, pull = pull.num, error = %e, "unable to delete plans");
        }
        info!(repo = %repo.full_name, pull = pull.num, "cleaned up closed pull request");
        EventOutcome::Closed
    }

    async fn run_admitted(&self, event: CommandEvent) -> EventOutcome {
        if let Some(cmd) = &event.command {
            if let Err(e) = cmd.validate() {
                let msg = e.to_string();
                self.comment(&event.base_repo, event.pull_num, &format!("**Error:** {msg}"), Some(cmd.name))
                    .await;
                return EventOutcome::Error(msg);
            }
        }

        let (pull, head_repo) = match self.resolve_pull(&event).await {
            Ok(resolved) => resolved,
            Err(e) => {
                error!(repo = %event.base_repo.full_name, pull = event.pull_num, error = %e, "unable to resolve pull request");
                return EventOutcome::Error(e.to_string());
            }
        };

        let pull_status = match self.deps.store.get(&pull.key()).await {
            Ok(status) => status,
            Err(e) => {
                warn!(pull = pull.num, error = %e, "unable to fetch pull status, continuing without it");
                None
            }
        };

        let ctx = EventContext {
            trigger: event.trigger(),
            base_repo: event.base_repo,
            head_repo,
            pull,
            user: event.user,
            trigger_timestamp: event.timestamp,
            pull_status,
            pull_mergeable: false,
        };

        if let Err(reason) = self.validate(&ctx).await {
            return EventOutcome::Rejected(reason);
        }

        let label = event
            .command
            .as_ref()
            .map_or("autoplan", |c| c.name.as_str());
        if staleness::is_stale(&ctx) {
            self.deps.metrics.inc_stale_commands_dropped();
            obs::emit_stale_dropped(&ctx.base_repo.full_name, ctx.pull.num, label);
            return EventOutcome::Stale;
        }

        if event.command.is_none() && self.deps.settings.config.disable_autoplan {
            info!(pull = ctx.pull.num, "autoplan is disabled, ignoring");
            return EventOutcome::AutoplanDisabled;
        }

        let command = event.command.as_ref().map_or(CommandName::Plan, |c| c.name);
        if let Err(e) = self.pre_hooks.run_pre_hooks(&ctx).await {
            warn!(pull = ctx.pull.num, error = %e, "pre workflow hooks failed");
            if let Some(status_command) = command.status_command() {
                self.deps.status.failed(&ctx, status_command).await;
            }
            return EventOutcome::HookFailed(e.to_string());
        }

        self.deps.metrics.inc_commands_started();
        obs::emit_command_started(&ctx.base_repo.full_name, ctx.pull.num, label, &ctx.user.username);

        let result = match &event.command {
            None => self.plan.run_autoplan(&ctx).await,
            Some(cmd) => match cmd.name {
                CommandName::Plan => self.plan.run(&ctx, cmd).await,
                CommandName::Apply => self.apply.run(&ctx, cmd).await,
                CommandName::PolicyCheck => self.policy_check.run(&ctx, cmd).await,
                CommandName::ApprovePolicies => self.approve_policies.run(&ctx, cmd).await,
                CommandName::Version => self.version.run(&ctx, cmd).await,
            },
        };
        obs::emit_command_finished(&ctx.base_repo.full_name, ctx.pull.num, command, &result);

        if let Err(e) = self.post_hooks.run_post_hooks(&ctx, command).await {
            warn!(pull = ctx.pull.num, error = %e, "post workflow hooks failed");
        }

        EventOutcome::Completed { command, result }
    }

    /// Use the pull and head repo from the webhook when present, else ask
    /// the VCS host.
    async fn resolve_pull(&self, event: &CommandEvent) -> Result<(PullRequest, Repo)> {
        if let (Some(pull), Some(head)) = (&event.pull, &event.head_repo) {
            return Ok((pull.clone(), head.clone()));
        }
        let host = event.base_repo.host;
        if host.embeds_pull_in_webhook() {
            return Err(EngineError::MissingPull {
                host: host.to_string(),
            });
        }
        debug!(pull = event.pull_num, "fetching pull request from vcs");
        let resolved = self
            .deps
            .vcs
            .fetch_pull(&event.base_repo, event.pull_num)
            .await?;
        Ok(resolved)
    }

    /// Fork, state and branch checks. On rejection the user gets at most one
    /// comment.
    async fn validate(&self, ctx: &EventContext) -> std::result::Result<(), String> {
        let config = &self.deps.settings.config;

        if ctx.head_repo.owner != ctx.base_repo.owner && !config.allow_fork_prs {
            info!(head = %ctx.head_repo.full_name, "rejecting fork pull request");
            if !config.silence_fork_pr_errors {
                self.comment(&ctx.base_repo, ctx.pull.num, render::FORK_PR_MSG, None)
                    .await;
            }
            return Err("fork pull requests are not allowed".to_string());
        }

        if ctx.pull.state == PullState::Closed {
            self.comment(&ctx.base_repo, ctx.pull.num, render::CLOSED_PULL_MSG, None)
                .await;
            return Err("pull request is closed".to_string());
        }

        if !self
            .deps
            .settings
            .repos
            .branch_matches(&ctx.base_repo.full_name, &ctx.pull.base_branch)
        {
            let msg = render::branch_mismatch_msg(&ctx.pull.base_branch);
            self.comment(&ctx.base_repo, ctx.pull.num, &msg, None).await;
            return Err(format!("base branch {} is not enabled", ctx.pull.base_branch));
        }

        Ok(())
    }

    async fn comment(&self, repo: &Repo, pull_num: u64, body: &str, command: Option<CommandName>) {
        if let Err(e) = self
            .deps
            .vcs
            .create_comment(repo, pull_num, body, command)
            .await
        {
            warn!(repo = %repo.full_name, pull = pull_num, error = %e, "unable to comment on pull request");
        }
    }
}

pub(crate) fn panic_detail(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_detail_extracts_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_detail(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_detail(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_detail(boxed.as_ref()), "unknown panic");
    }
}
