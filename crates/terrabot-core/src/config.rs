//! Engine configuration and compiled per-repo policies.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{EngineError, Result};

/// Process-level engine settings. Every field has a default so a partial
/// `[engine]` table deserializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Prefix of every commit status context, e.g. `terrabot/plan`.
    pub status_name: String,
    /// Worker pool size for parallel plan/apply.
    pub parallel_pool_size: usize,
    pub automerge: bool,
    pub delete_source_branch_on_merge: bool,
    /// Users allowed to run `approve_policies`.
    pub policy_approvers: Vec<String>,
    /// Reject `apply` comments that don't target a dir, workspace or project.
    pub disable_apply_all: bool,
    pub disable_autoplan: bool,
    pub allow_fork_prs: bool,
    pub silence_fork_pr_errors: bool,
    /// Don't comment when a comment command matched no projects.
    pub silence_no_projects: bool,
    /// Don't push success(0/0) statuses when no projects were found.
    pub silence_vcs_status_no_plans: bool,
    pub repos: Vec<RepoConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            status_name: "terrabot".to_string(),
            parallel_pool_size: 15,
            automerge: false,
            delete_source_branch_on_merge: false,
            policy_approvers: Vec::new(),
            disable_apply_all: false,
            disable_autoplan: false,
            allow_fork_prs: false,
            silence_fork_pr_errors: false,
            silence_no_projects: false,
            silence_vcs_status_no_plans: false,
            repos: Vec::new(),
        }
    }
}

/// Per-repo overrides, matched against `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    /// Regex over the repo full name; implicitly anchored.
    pub id: String,
    /// Base branches commands are accepted for; any branch when unset.
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub automerge: Option<bool>,
    #[serde(default)]
    pub delete_source_branch_on_merge: Option<bool>,
}

#[derive(Debug, Clone)]
struct CompiledRepo {
    id: Regex,
    branch: Option<Regex>,
    automerge: Option<bool>,
    delete_source_branch_on_merge: Option<bool>,
}

fn anchored(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|source| EngineError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Per-repo rules with their patterns compiled once.
#[derive(Debug, Clone, Default)]
pub struct RepoPolicies {
    repos: Vec<CompiledRepo>,
}

impl RepoPolicies {
    pub fn compile(repos: &[RepoConfig]) -> Result<Self> {
        let repos = repos
            .iter()
            .map(|r| {
                Ok(CompiledRepo {
                    id: anchored(&r.id)?,
                    branch: r.branch.as_deref().map(anchored).transpose()?,
                    automerge: r.automerge,
                    delete_source_branch_on_merge: r.delete_source_branch_on_merge,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { repos })
    }

    fn find(&self, repo_full_name: &str) -> Option<&CompiledRepo> {
        self.repos.iter().find(|r| r.id.is_match(repo_full_name))
    }

    /// True unless the first matching repo entry restricts base branches and
    /// `base_branch` isn't one of them.
    pub fn branch_matches(&self, repo_full_name: &str, base_branch: &str) -> bool {
        match self.find(repo_full_name).and_then(|r| r.branch.as_ref()) {
            Some(branch) => branch.is_match(base_branch),
            None => true,
        }
    }

    pub fn automerge_enabled(&self, repo_full_name: &str, global: bool) -> bool {
        self.find(repo_full_name)
            .and_then(|r| r.automerge)
            .unwrap_or(global)
    }

    pub fn delete_source_branch(&self, repo_full_name: &str, global: bool) -> bool {
        self.find(repo_full_name)
            .and_then(|r| r.delete_source_branch_on_merge)
            .unwrap_or(global)
    }
}

/// Validated configuration the engine runs with.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub config: EngineConfig,
    pub repos: RepoPolicies,
}

impl EngineSettings {
    pub fn new(config: EngineConfig) -> Result<Self> {
        if config.parallel_pool_size == 0 {
            return Err(EngineError::InvalidConfig(
                "parallel_pool_size must be at least 1".to_string(),
            ));
        }
        if config.status_name.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "status_name must not be empty".to_string(),
            ));
        }
        let repos = RepoPolicies::compile(&config.repos)?;
        Ok(Self { config, repos })
    }

    pub fn automerge_enabled(&self, repo_full_name: &str) -> bool {
        self.repos
            .automerge_enabled(repo_full_name, self.config.automerge)
    }

    pub fn delete_source_branch(&self, repo_full_name: &str) -> bool {
        self.repos
            .delete_source_branch(repo_full_name, self.config.delete_source_branch_on_merge)
    }
}
