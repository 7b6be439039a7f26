//! `[github]` configuration section.

use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

/// GitHub rejects comments longer than this many characters.
pub const MAX_COMMENT_CHARS: usize = 65_536;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_base_url: String,
    /// Personal access or installation token. Falls back to `GITHUB_TOKEN`.
    pub token: Option<String>,
    pub user_agent: String,
    pub timeout_secs: u64,
    /// `merge`, `squash` or `rebase`.
    pub merge_method: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            token: None,
            user_agent: concat!("terrabot/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 30,
            merge_method: "merge".to_string(),
        }
    }
}

impl GitHubConfig {
    /// Fill in the token from the environment if none was configured.
    pub fn with_env_token(mut self) -> Self {
        if self.token.is_none() {
            self.token = std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty());
        }
        self
    }
}
