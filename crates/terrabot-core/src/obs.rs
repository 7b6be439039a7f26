//! Structured observability hooks for command lifecycle events.
//!
//! This module provides:
//! - Command-scoped tracing spans via the `CommandSpan` RAII guard
//! - Emission functions for key lifecycle events: start, finish, stale drop,
//!   unit completion, automerge and recovered panics
//!
//! Events are emitted at `info!` level unless noted (filter with `RUST_LOG`).

use tracing::{info, warn};

use crate::domain::{CommandName, CommandResult, ProjectResult};

/// RAII guard that enters a command-scoped span for its lifetime.
///
/// Only use it in synchronous sections; async code should attach the span
/// from [`command_span`] with `Instrument` instead.
pub struct CommandSpan {
    _span: tracing::span::EnteredSpan,
}

impl CommandSpan {
    pub fn enter(repo: &str, pull: u64, command: &str) -> Self {
        Self {
            _span: command_span(repo, pull, command).entered(),
        }
    }
}

/// Span tagged with repo, pull and command.
pub fn command_span(repo: &str, pull: u64, command: &str) -> tracing::Span {
    tracing::info_span!("terrabot.command", repo = %repo, pull = pull, command = %command)
}

pub fn emit_command_started(repo: &str, pull: u64, command: &str, user: &str) {
    info!(
        event = "command.started",
        repo = %repo,
        pull = pull,
        command = %command,
        user = %user,
    );
}

pub fn emit_command_finished(repo: &str, pull: u64, command: CommandName, result: &CommandResult) {
    let errored = result
        .project_results
        .iter()
        .filter(|r| r.is_errored())
        .count();
    info!(
        event = "command.finished",
        repo = %repo,
        pull = pull,
        command = %command,
        projects = result.project_results.len(),
        errored = errored,
        top_level_error = result.error.is_some() || result.failure.is_some(),
    );
}

/// Emit event: command dropped because a newer status was already persisted.
pub fn emit_stale_dropped(repo: &str, pull: u64, command: &str) {
    info!(event = "command.stale_dropped", repo = %repo, pull = pull, command = %command);
}

pub fn emit_unit_finished(result: &ProjectResult) {
    info!(
        event = "unit.finished",
        command = %result.command,
        project = %result.project_name,
        dir = %result.repo_rel_dir,
        workspace = %result.workspace,
        success = result.is_successful(),
    );
}

pub fn emit_automerge(repo: &str, pull: u64, merged: bool) {
    info!(event = "automerge", repo = %repo, pull = pull, merged = merged);
}

/// Emit event: a panic was caught and converted (warning level).
pub fn emit_panic_recovered(scope: &str, detail: &str) {
    warn!(event = "panic.recovered", scope = %scope, detail = %detail);
}
