//! Storage trait definitions for pull status persistence.
//!
//! `PullStatusStore` is async and backend-agnostic. An in-memory fake lives
//! in the `fakes` module; `surreal_store` provides the SurrealDB backend.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::schema::{ProjectStatus, PullKey, PullStatus};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Per-pull-request status store.
///
/// Guarantees:
/// - `update` applies [`PullStatus::merge`] semantics and stamps `updated_at`.
/// - `get` after `delete` returns `None`.
/// - Writes for different pulls never interfere.
#[async_trait]
pub trait PullStatusStore: Send + Sync {
    /// Fetch the persisted status for a pull, if any.
    async fn get(&self, pull: &PullKey) -> StorageResult<Option<PullStatus>>;

    /// Merge `updates` into the stored status and return the new aggregate.
    async fn update(
        &self,
        pull: &PullKey,
        head_commit: &str,
        updates: Vec<ProjectStatus>,
    ) -> StorageResult<PullStatus>;

    /// Remove the status for a pull. Returns what was removed.
    async fn delete(&self, pull: &PullKey) -> StorageResult<Option<PullStatus>>;
}
