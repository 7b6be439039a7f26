//! Hands incoming events to the [`CommandRunner`].
//!
//! In background mode every event runs as its own task so the transport can
//! acknowledge immediately. Inline mode awaits each event, for deterministic
//! tests and the daemon's `--sync` flag.

use std::sync::{Arc, Mutex};

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::command_runner::{CommandRunner, EventOutcome};
use crate::domain::IncomingEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    Background,
    Inline,
}

pub struct EventDispatcher {
    runner: Arc<CommandRunner>,
    mode: DispatchMode,
    tasks: Mutex<JoinSet<EventOutcome>>,
}

impl EventDispatcher {
    pub fn new(runner: Arc<CommandRunner>, mode: DispatchMode) -> Self {
        Self {
            runner,
            mode,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn runner(&self) -> &Arc<CommandRunner> {
        &self.runner
    }

    /// Submit one event. Returns its outcome in inline mode, `None` in
    /// background mode.
    pub async fn submit(&self, event: IncomingEvent) -> Option<EventOutcome> {
        match self.mode {
            DispatchMode::Inline => Some(run_event(&self.runner, event).await),
            DispatchMode::Background => {
                let runner = Arc::clone(&self.runner);
                let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
                // Reap finished tasks so a long-lived daemon doesn't accumulate them.
                while let Some(done) = tasks.try_join_next() {
                    log_join(done);
                }
                tasks.spawn(async move { run_event(&runner, event).await });
                None
            }
        }
    }

    /// Wait for every background task submitted so far.
    pub async fn join_all(&self) -> Vec<EventOutcome> {
        let mut tasks = {
            let mut guard = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };
        let mut outcomes = Vec::new();
        while let Some(done) = tasks.join_next().await {
            if let Some(outcome) = log_join(done) {
                outcomes.push(outcome);
            }
        }
        outcomes
    }
}

async fn run_event(runner: &CommandRunner, event: IncomingEvent) -> EventOutcome {
    match event {
        IncomingEvent::Command(cmd) => runner.run(cmd).await,
        IncomingEvent::PullClosed { repo, pull } => runner.run_pull_closed(&repo, &pull).await,
    }
}

fn log_join(done: Result<EventOutcome, tokio::task::JoinError>) -> Option<EventOutcome> {
    match done {
        Ok(outcome) => {
            debug!(?outcome, "event finished");
            Some(outcome)
        }
        Err(e) => {
            warn!(error = %e, "event task did not complete");
            None
        }
    }
}
