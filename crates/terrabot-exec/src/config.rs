//! The `[exec]` section of the daemon configuration.
//!
//! ```toml
//! [exec]
//! data_dir = "/var/lib/terrabot"
//! policy_check = true
//!
//! [[exec.projects]]
//! name = "network"
//! dir = "network"
//! parallel_plan = true
//! policy_sets = ["policies/network"]
//!
//! [exec.workflows.custom]
//! plan = [["terragrunt", "plan", "-out", "{plan}"]]
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use terrabot_core::{ApplyRequirement, CommandName};

use crate::error::{ExecError, Result};

/// Name of the workflow used when a project doesn't pick one.
pub const DEFAULT_WORKFLOW: &str = "default";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Root under which pull request checkouts live.
    pub data_dir: PathBuf,
    /// Upper bound for a single step. Zero disables the limit.
    pub step_timeout_secs: u64,
    /// Emit policy-check units alongside plan units.
    pub policy_check: bool,
    pub workflows: HashMap<String, Workflow>,
    pub projects: Vec<ProjectConfig>,
    pub pre_workflow_hooks: Vec<Vec<String>>,
    pub post_workflow_hooks: Vec<Vec<String>>,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("terrabot-data"),
            step_timeout_secs: 3600,
            policy_check: false,
            workflows: HashMap::new(),
            projects: Vec::new(),
            pre_workflow_hooks: Vec::new(),
            post_workflow_hooks: Vec::new(),
        }
    }
}

impl ExecConfig {
    /// Resolve a workflow by name. `None` means the default workflow, which
    /// may itself be overridden under `[exec.workflows.default]`.
    pub fn workflow(&self, name: Option<&str>) -> Result<Workflow> {
        match name {
            None => Ok(self
                .workflows
                .get(DEFAULT_WORKFLOW)
                .cloned()
                .unwrap_or_default()),
            Some(name) => self
                .workflows
                .get(name)
                .cloned()
                .or_else(|| (name == DEFAULT_WORKFLOW).then(Workflow::default))
                .ok_or_else(|| ExecError::UnknownWorkflow(name.to_string())),
        }
    }
}

/// Argv lists per command. Arguments may use the placeholders `{plan}`,
/// `{dir}`, `{workspace}` and `{project}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Workflow {
    pub plan: Vec<Vec<String>>,
    pub apply: Vec<Vec<String>>,
    pub policy_check: Vec<Vec<String>>,
    pub version: Vec<Vec<String>>,
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

impl Default for Workflow {
    fn default() -> Self {
        Self {
            plan: vec![
                argv(&["terraform", "init", "-input=false"]),
                argv(&["terraform", "plan", "-input=false", "-out", "{plan}"]),
            ],
            apply: vec![argv(&["terraform", "apply", "{plan}"])],
            policy_check: vec![
                argv(&["sh", "-c", "terraform show -json {plan} > {plan}.json"]),
                argv(&["conftest", "test", "{plan}.json"]),
            ],
            version: vec![argv(&["terraform", "version"])],
        }
    }
}

impl Workflow {
    pub fn steps_for(&self, command: CommandName) -> Vec<Vec<String>> {
        match command {
            CommandName::Plan => self.plan.clone(),
            CommandName::Apply => self.apply.clone(),
            CommandName::PolicyCheck => self.policy_check.clone(),
            CommandName::Version => self.version.clone(),
            CommandName::ApprovePolicies => Vec::new(),
        }
    }
}

/// One `[[exec.projects]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub dir: String,
    #[serde(default = "default_workspace")]
    pub workspace: String,
    #[serde(default = "default_true")]
    pub autoplan: bool,
    #[serde(default)]
    pub parallel_plan: bool,
    #[serde(default)]
    pub parallel_apply: bool,
    #[serde(default)]
    pub policy_sets: Vec<String>,
    #[serde(default)]
    pub apply_requirements: Vec<ApplyRequirement>,
    #[serde(default)]
    pub workflow: Option<String>,
}

impl ProjectConfig {
    /// An unconfigured project targeted directly by a comment.
    pub fn ad_hoc(dir: impl Into<String>, workspace: impl Into<String>) -> Self {
        Self {
            name: None,
            dir: dir.into(),
            workspace: workspace.into(),
            autoplan: false,
            parallel_plan: false,
            parallel_apply: false,
            policy_sets: Vec::new(),
            apply_requirements: Vec::new(),
            workflow: None,
        }
    }
}

pub fn default_workspace() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}
