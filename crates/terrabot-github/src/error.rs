//! Error types for the GitHub client

use terrabot_core::CollaboratorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GitHubError {
    /// Transport failure, or a non-2xx response when `status` is set.
    #[error("GitHub request failed{}: {message}", status_suffix(.status))]
    Http { status: Option<u16>, message: String },

    #[error("unexpected GitHub response: {0}")]
    Parse(String),

    #[error("invalid GitHub configuration: {0}")]
    Config(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl From<reqwest::Error> for GitHubError {
    fn from(err: reqwest::Error) -> Self {
        GitHubError::Http {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for GitHubError {
    fn from(err: serde_json::Error) -> Self {
        GitHubError::Parse(err.to_string())
    }
}

impl From<GitHubError> for CollaboratorError {
    fn from(err: GitHubError) -> Self {
        CollaboratorError::Vcs(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GitHubError>;
