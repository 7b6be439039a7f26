//! Domain models for terrabot.
//!
//! Canonical definitions for the values flowing through the engine:
//! - `CommentCommand`: a parsed pull request command
//! - `CommandEvent` / `EventContext`: a normalized event and its resolved context
//! - `ProjectUnit`: one project scope to run a command against
//! - `ProjectResult` / `CommandResult`: outcomes

pub mod command;
pub mod error;
pub mod event;
pub mod project;
pub mod result;

pub use command::{CommandName, CommentCommand};
pub use error::{CollaboratorError, CollaboratorResult, EngineError, Result};
pub use event::{
    CommandEvent, EventContext, IncomingEvent, PullRequest, PullState, Repo, Trigger, User,
    VcsHost,
};
pub use project::{ApplyRequirement, ProjectUnit};
pub use result::{CommandResult, ProjectOutcome, ProjectResult, ProjectSuccess};
