//! Pull-State: persisted per-pull-request project status
//!
//! This crate owns the one piece of durable state the orchestration engine
//! reads and writes: the aggregate status of every project in a pull
//! request, and the timestamp of its last update.
//!
//! ## Key Components
//!
//! - `PullStatus`: the persisted aggregate and its merge rules
//! - `PullStatusStore`: backend-agnostic async store trait
//! - `MemoryPullStatusStore`: in-memory fake for tests
//! - `SurrealPullStatusStore`: SurrealDB backend

mod error;
pub mod fakes;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use error::StorageError;
pub use schema::{ProjectPlanStatus, ProjectStatus, PullKey, PullStatus};
pub use storage_traits::{PullStatusStore, StorageResult};
pub use surreal_store::SurrealPullStatusStore;
