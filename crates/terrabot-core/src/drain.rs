//! Graceful-shutdown admission control.
//!
//! A [`Drainer`] counts in-flight operations and stops admitting new ones once
//! shutdown has been requested. It is owned by the process and shared as an
//! `Arc`, never a global.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct DrainState {
    shutting_down: bool,
    in_progress: usize,
}

/// Point-in-time view of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DrainStatus {
    pub shutting_down: bool,
    pub in_progress_ops: usize,
}

#[derive(Debug)]
pub struct Drainer {
    state: watch::Sender<DrainState>,
}

impl Default for Drainer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drainer {
    pub fn new() -> Self {
        let (state, _) = watch::channel(DrainState::default());
        Self { state }
    }

    /// Try to admit one operation. Returns false once shutdown has started.
    ///
    /// Every `true` must be paired with exactly one [`Drainer::op_done`];
    /// prefer [`Drainer::admit`], which pairs them automatically.
    pub fn start_op(&self) -> bool {
        self.state.send_if_modified(|s| {
            if s.shutting_down {
                return false;
            }
            s.in_progress += 1;
            true
        })
    }

    pub fn op_done(&self) {
        self.state.send_modify(|s| {
            s.in_progress = s.in_progress.saturating_sub(1);
        });
    }

    /// Admit one operation, releasing it when the guard drops.
    pub fn admit(self: &Arc<Self>) -> Option<OpGuard> {
        self.start_op().then(|| OpGuard {
            drainer: Arc::clone(self),
        })
    }

    /// Stop admitting new operations and wait for in-flight ones to finish.
    pub async fn shutdown(&self) {
        let in_progress = {
            let mut n = 0;
            self.state.send_modify(|s| {
                s.shutting_down = true;
                n = s.in_progress;
            });
            n
        };
        info!(in_progress_ops = in_progress, "drain started");

        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel can't close while we wait.
        let _ = rx.wait_for(|s| s.in_progress == 0).await;
        info!("drain complete");
    }

    pub fn status(&self) -> DrainStatus {
        let s = *self.state.borrow();
        DrainStatus {
            shutting_down: s.shutting_down,
            in_progress_ops: s.in_progress,
        }
    }
}

/// Releases its admitted operation on drop.
#[derive(Debug)]
pub struct OpGuard {
    drainer: Arc<Drainer>,
}

impl Drop for OpGuard {
    fn drop(&mut self) {
        self.drainer.op_done();
    }
}
