//! Terrabot Core: the command orchestration engine
//!
//! Turns normalized pull request events into Terraform plan, policy check and
//! apply runs across the projects of a repository, keeping the persisted pull
//! status and the visible commit status in sync.
//!
//! ## Key Components
//!
//! - `CommandRunner`: entry point; admission, validation, staleness, hooks
//! - `runners`: per-command policy (plan, apply, policy check, approve, version)
//! - `Dispatcher`: serial and bounded-parallel unit execution
//! - `Drainer`: graceful-shutdown admission control
//! - `Automerger`: merge once every project is applied
//! - `collaborators`: traits for everything outside the engine

pub mod automerge;
pub mod collaborators;
pub mod command_runner;
pub mod commit_status;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod drain;
pub mod event_dispatcher;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod render;
pub mod runners;
pub mod staleness;
pub mod telemetry;

pub use automerge::{AutomergeOutcome, Automerger};
pub use collaborators::{
    Collaborators, CommitState, CommitStatusUpdater, MergeOptions, PlanCleaner,
    PostWorkflowHookRunner, PreWorkflowHookRunner, ProjectExecutor, ProjectUnitBuilder, VcsClient,
};
pub use command_runner::{CommandRunner, EventOutcome};
pub use config::{EngineConfig, EngineSettings, RepoConfig};
pub use dispatch::Dispatcher;
pub use domain::{
    ApplyRequirement, CollaboratorError, CollaboratorResult, CommandEvent, CommandName,
    CommandResult, CommentCommand, EngineError, EventContext, IncomingEvent, ProjectOutcome,
    ProjectResult, ProjectSuccess, ProjectUnit, PullRequest, PullState, Repo, Result, Trigger,
    User, VcsHost,
};
pub use drain::{DrainStatus, Drainer};
pub use event_dispatcher::{DispatchMode, EventDispatcher};
pub use metrics::Metrics;
