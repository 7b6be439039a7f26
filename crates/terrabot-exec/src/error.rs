//! Errors raised while running workflow steps on disk.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("step {index} has an empty command")]
    EmptyCommand { index: usize },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs} seconds")]
    Timeout { program: String, secs: u64 },

    #[error("workspace {0} is locked by another command")]
    Locked(String),

    #[error("project directory {} does not exist", .0.display())]
    MissingCheckout(PathBuf),

    #[error("unknown workflow {0:?}")]
    UnknownWorkflow(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExecError>;
