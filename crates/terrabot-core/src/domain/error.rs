//! Error taxonomy for the orchestration engine.

use pull_state::StorageError;

/// Errors returned by the engine's external collaborators.
///
/// The engine never propagates these past a single command: they are either
/// surfaced to the user as a top-level command error or logged and swallowed.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("vcs error: {0}")]
    Vcs(String),

    #[error("could not determine projects: {0}")]
    Builder(String),

    #[error("workflow hook failed: {0}")]
    Hook(String),

    #[error("plan cleanup failed: {0}")]
    Cleanup(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for collaborator calls.
pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

/// Engine-level errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// The webhook for this host must carry the pull request; getting here
    /// without one is a bug in the event parser.
    #[error("{host} events must include the pull request and head repo")]
    MissingPull { host: String },

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collaborator_error_display() {
        let err = CollaboratorError::Builder("bad config".to_string());
        assert_eq!(err.to_string(), "could not determine projects: bad config");
    }

    #[test]
    fn test_storage_error_converts() {
        let err: CollaboratorError = StorageError::Backend("down".to_string()).into();
        assert!(err.to_string().contains("down"));
    }

    #[test]
    fn test_invalid_pattern_mentions_pattern() {
        let source = regex::Regex::new("(").unwrap_err();
        let err = EngineError::InvalidPattern {
            pattern: "(".to_string(),
            source,
        };
        assert!(err.to_string().contains("\"(\""));
    }
}
