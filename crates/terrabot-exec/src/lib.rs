//! Terrabot Exec: process-backed collaborators
//!
//! Implements the engine's project builder, executor, hooks and plan cleanup
//! on top of a local data directory holding one checkout per pull request.
//!
//! ## Key Components
//!
//! - `ConfiguredUnitBuilder`: units from `[[exec.projects]]`
//! - `StepProjectExecutor`: runs workflow steps under a workspace try-lock
//! - `ShellHookRunner`: pre/post workflow hooks
//! - `PlanFileCleaner`: removes `*.tfplan` files for a pull request

pub mod builder;
pub mod cleaner;
pub mod config;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod locker;
pub mod paths;
pub mod step;

pub use builder::ConfiguredUnitBuilder;
pub use cleaner::PlanFileCleaner;
pub use config::{ExecConfig, ProjectConfig, Workflow};
pub use error::{ExecError, Result};
pub use executor::StepProjectExecutor;
pub use hooks::ShellHookRunner;
pub use locker::{WorkspaceLock, WorkspaceLocker};
