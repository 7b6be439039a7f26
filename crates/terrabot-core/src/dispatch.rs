//! Serial and bounded-parallel execution of project units.
//!
//! Every unit yields exactly one result, in input order. A unit that panics
//! is turned into an error result; siblings keep running.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tracing::instrument;

use crate::domain::{CommandResult, ProjectResult, ProjectUnit};
use crate::metrics::Metrics;
use crate::obs;

/// Message recorded on a unit whose execution panicked.
pub const UNIT_PANIC_MSG: &str = "project execution panicked; this is a bug";

#[derive(Clone)]
pub struct Dispatcher {
    pool_size: usize,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    /// `pool_size` is clamped to at least one.
    pub fn new(pool_size: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            pool_size: pool_size.max(1),
            metrics,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub async fn run<F, Fut>(&self, units: Vec<ProjectUnit>, parallel: bool, execute: F) -> CommandResult
    where
        F: Fn(ProjectUnit) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProjectResult> + Send + 'static,
    {
        if parallel {
            self.run_parallel(units, execute).await
        } else {
            self.run_serial(units, execute).await
        }
    }

    #[instrument(skip_all, fields(units = units.len()))]
    pub async fn run_serial<F, Fut>(&self, units: Vec<ProjectUnit>, execute: F) -> CommandResult
    where
        F: Fn(ProjectUnit) -> Fut,
        Fut: Future<Output = ProjectResult>,
    {
        let mut results = Vec::with_capacity(units.len());
        for unit in units {
            let fallback = ProjectResult::error(&unit, UNIT_PANIC_MSG);
            let result = match AssertUnwindSafe(execute(unit)).catch_unwind().await {
                Ok(result) => result,
                Err(_) => self.recovered(fallback),
            };
            results.push(result);
        }
        CommandResult::from_results(results)
    }

    #[instrument(skip_all, fields(units = units.len(), pool_size = self.pool_size))]
    pub async fn run_parallel<F, Fut>(&self, units: Vec<ProjectUnit>, execute: F) -> CommandResult
    where
        F: Fn(ProjectUnit) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProjectResult> + Send + 'static,
    {
        let execute = Arc::new(execute);
        let sem = Arc::new(Semaphore::new(self.pool_size));

        let mut tasks = Vec::with_capacity(units.len());
        for unit in units {
            let fallback = ProjectResult::error(&unit, UNIT_PANIC_MSG);
            let execute = Arc::clone(&execute);
            let sem = Arc::clone(&sem);
            let task = tokio::spawn(async move {
                // The semaphore is never closed, so acquire only fails if it is.
                let _permit = sem.acquire_owned().await.ok();
                execute(unit).await
            });
            tasks.push((task, fallback));
        }

        // Awaiting in spawn order keeps results in input order.
        let mut results = Vec::with_capacity(tasks.len());
        for (task, fallback) in tasks {
            let result = match task.await {
                Ok(result) => result,
                Err(_) => self.recovered(fallback),
            };
            results.push(result);
        }
        CommandResult::from_results(results)
    }

    fn recovered(&self, fallback: ProjectResult) -> ProjectResult {
        self.metrics.inc_unit_panics();
        obs::emit_panic_recovered("unit", &fallback.display_name());
        fallback
    }
}
