//! In-memory fakes for storage traits (testing only)
//!
//! `MemoryPullStatusStore` satisfies the `PullStatusStore` contract without
//! any external dependencies, and can be told to fail reads or writes so
//! callers can exercise their infrastructure-error paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::schema::{ProjectStatus, PullKey, PullStatus};
use crate::storage_traits::*;

/// In-memory pull status store backed by a `HashMap<PullKey, PullStatus>`.
#[derive(Debug, Default)]
pub struct MemoryPullStatusStore {
    statuses: Mutex<HashMap<PullKey, PullStatus>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryPullStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `get` return a backend error.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `update`/`delete` return a backend error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Seed a status directly, bypassing merge (for staleness tests).
    pub fn insert(&self, status: PullStatus) {
        let mut statuses = self.statuses.lock().unwrap_or_else(|e| e.into_inner());
        statuses.insert(status.pull.clone(), status);
    }
}

#[async_trait]
impl PullStatusStore for MemoryPullStatusStore {
    async fn get(&self, pull: &PullKey) -> StorageResult<Option<PullStatus>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("injected read failure".to_string()));
        }
        let statuses = self.statuses.lock().unwrap_or_else(|e| e.into_inner());
        Ok(statuses.get(pull).cloned())
    }

    async fn update(
        &self,
        pull: &PullKey,
        head_commit: &str,
        updates: Vec<ProjectStatus>,
    ) -> StorageResult<PullStatus> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("injected write failure".to_string()));
        }
        let mut statuses = self.statuses.lock().unwrap_or_else(|e| e.into_inner());
        let prior = statuses.remove(pull);
        let merged = PullStatus::merge(prior, pull, head_commit, updates, Utc::now());
        statuses.insert(pull.clone(), merged.clone());
        Ok(merged)
    }

    async fn delete(&self, pull: &PullKey) -> StorageResult<Option<PullStatus>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("injected write failure".to_string()));
        }
        let mut statuses = self.statuses.lock().unwrap_or_else(|e| e.into_inner());
        Ok(statuses.remove(pull))
    }
}
