//! Daemon configuration: one TOML file, overridden by CLI flags.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use terrabot_core::EngineConfig;
use terrabot_exec::ExecConfig;
use terrabot_github::GitHubConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub engine: EngineConfig,
    pub github: GitHubConfig,
    pub exec: ExecConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SurrealDB endpoint: `mem://`, `surrealkv://<path>` or `ws://host:port`.
    pub url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "mem://".to_string(),
        }
    }
}

/// Process-level overrides taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub db: Option<String>,
    pub disable_autoplan: bool,
    pub disable_apply_all: bool,
    pub automerge: bool,
    pub parallel_pool_size: Option<usize>,
    pub policy_approvers: Vec<String>,
}

impl DaemonConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse terrabot configuration")
    }

    /// Load from `path`, or defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            None => Ok(Self::default()),
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::parse(&text)
            }
        }
    }

    /// Flags only ever switch features on or replace values; an unset flag
    /// leaves the file's value alone.
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(db) = overrides.db {
            self.store.url = db;
        }
        if overrides.disable_autoplan {
            self.engine.disable_autoplan = true;
        }
        if overrides.disable_apply_all {
            self.engine.disable_apply_all = true;
        }
        if overrides.automerge {
            self.engine.automerge = true;
        }
        if let Some(size) = overrides.parallel_pool_size {
            self.engine.parallel_pool_size = size;
        }
        if !overrides.policy_approvers.is_empty() {
            self.engine.policy_approvers = overrides.policy_approvers;
        }
    }
}
