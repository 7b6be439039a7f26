//! Commands a pull request can trigger.

use serde::{Deserialize, Serialize};

use super::error::{EngineError, Result};

/// The closed set of commands the engine knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandName {
    Plan,
    Apply,
    PolicyCheck,
    ApprovePolicies,
    Version,
}

impl CommandName {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandName::Plan => "plan",
            CommandName::Apply => "apply",
            CommandName::PolicyCheck => "policy_check",
            CommandName::ApprovePolicies => "approve_policies",
            CommandName::Version => "version",
        }
    }

    /// Capitalised name used in comments and status descriptions.
    pub fn title(self) -> &'static str {
        match self {
            CommandName::Plan => "Plan",
            CommandName::Apply => "Apply",
            CommandName::PolicyCheck => "Policy Check",
            CommandName::ApprovePolicies => "Approve Policies",
            CommandName::Version => "Version",
        }
    }

    /// Verb used in "N/M projects <verb> successfully".
    pub fn past_tense(self) -> &'static str {
        match self {
            CommandName::Plan => "planned",
            CommandName::Apply => "applied",
            CommandName::PolicyCheck | CommandName::ApprovePolicies => "policies checked",
            CommandName::Version => "version checked",
        }
    }

    /// The commit status this command reports under, if any.
    ///
    /// Approving policies moves the policy check status; version never
    /// touches commit statuses.
    pub fn status_command(self) -> Option<CommandName> {
        match self {
            CommandName::Plan | CommandName::Apply | CommandName::PolicyCheck => Some(self),
            CommandName::ApprovePolicies => Some(CommandName::PolicyCheck),
            CommandName::Version => None,
        }
    }
}

impl std::fmt::Display for CommandName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command parsed from a pull request comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentCommand {
    pub name: CommandName,
    #[serde(default)]
    pub repo_rel_dir: Option<String>,
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
    /// Extra arguments passed through to the workflow.
    #[serde(default)]
    pub flags: Vec<String>,
    /// Bypass apply requirements.
    #[serde(default)]
    pub force_apply: bool,
}

impl CommentCommand {
    pub fn new(name: CommandName) -> Self {
        Self {
            name,
            repo_rel_dir: None,
            workspace: None,
            project_name: None,
            flags: Vec::new(),
            force_apply: false,
        }
    }

    pub fn with_dir(mut self, dir: impl Into<String>) -> Self {
        self.repo_rel_dir = Some(dir.into());
        self
    }

    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project_name = Some(project.into());
        self
    }

    pub fn with_flags(mut self, flags: Vec<String>) -> Self {
        self.flags = flags;
        self
    }

    pub fn forced(mut self) -> Self {
        self.force_apply = true;
        self
    }

    /// True if the command targets a dir, workspace or project rather than
    /// everything in the pull request.
    pub fn is_for_specific_project(&self) -> bool {
        self.repo_rel_dir.is_some() || self.workspace.is_some() || self.project_name.is_some()
    }

    /// Reject combinations the parser should never produce.
    pub fn validate(&self) -> Result<()> {
        if self.project_name.is_some() && (self.repo_rel_dir.is_some() || self.workspace.is_some())
        {
            return Err(EngineError::InvalidCommand(
                "cannot use -p/--project at same time as -d/--dir or -w/--workspace".to_string(),
            ));
        }
        if self.force_apply && self.name != CommandName::Apply {
            return Err(EngineError::InvalidCommand(format!(
                "--force is only valid for apply, not {}",
                self.name
            )));
        }
        Ok(())
    }
}
