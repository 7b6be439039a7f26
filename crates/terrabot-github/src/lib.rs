//! GitHub collaborator for terrabot
//!
//! `GitHubClient` talks to the GitHub REST API (or GitHub Enterprise via
//! `api_base_url`) and implements both `VcsClient` and `CommitStatusUpdater`.

pub mod client;
pub mod config;
pub mod error;

pub use client::GitHubClient;
pub use config::GitHubConfig;
pub use error::{GitHubError, Result};
