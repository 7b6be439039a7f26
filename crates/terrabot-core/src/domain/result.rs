//! Per-project and per-command outcomes.

use pull_state::{ProjectPlanStatus, ProjectStatus};
use serde::{Deserialize, Serialize};

use super::command::CommandName;
use super::project::ProjectUnit;

/// Command-specific success payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProjectSuccess {
    Plan { summary: String, has_changes: bool },
    Apply { output: String },
    PolicyCheck { output: String },
    ApprovePolicies,
    Version { output: String },
}

/// Exactly one of success, failure or error.
///
/// A failure is an expected negative outcome (plan rejected, policy failed);
/// an error means the unit could not run properly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectOutcome {
    Success(ProjectSuccess),
    Failure(String),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectResult {
    pub command: CommandName,
    pub repo_rel_dir: String,
    pub workspace: String,
    pub project_name: String,
    pub outcome: ProjectOutcome,
}

impl ProjectResult {
    pub fn for_unit(unit: &ProjectUnit, outcome: ProjectOutcome) -> Self {
        Self {
            command: unit.command,
            repo_rel_dir: unit.repo_rel_dir.clone(),
            workspace: unit.workspace.clone(),
            project_name: unit.project_name.clone(),
            outcome,
        }
    }

    pub fn success(unit: &ProjectUnit, success: ProjectSuccess) -> Self {
        Self::for_unit(unit, ProjectOutcome::Success(success))
    }

    pub fn failure(unit: &ProjectUnit, msg: impl Into<String>) -> Self {
        Self::for_unit(unit, ProjectOutcome::Failure(msg.into()))
    }

    pub fn error(unit: &ProjectUnit, msg: impl Into<String>) -> Self {
        Self::for_unit(unit, ProjectOutcome::Error(msg.into()))
    }

    pub fn is_successful(&self) -> bool {
        matches!(self.outcome, ProjectOutcome::Success(_))
    }

    /// Failures and errors both count as errored in aggregates.
    pub fn is_errored(&self) -> bool {
        !self.is_successful()
    }

    /// Project name if set, else `dir/workspace`.
    pub fn display_name(&self) -> String {
        if self.project_name.is_empty() {
            format!("{}/{}", self.repo_rel_dir, self.workspace)
        } else {
            self.project_name.clone()
        }
    }

    /// Persisted status this result maps to. Version results are never
    /// persisted.
    pub fn plan_status(&self) -> Option<ProjectPlanStatus> {
        let ok = self.is_successful();
        let status = match self.command {
            CommandName::Plan if ok => ProjectPlanStatus::Planned,
            CommandName::Plan => ProjectPlanStatus::ErroredPlan,
            CommandName::Apply if ok => ProjectPlanStatus::Applied,
            CommandName::Apply => ProjectPlanStatus::ErroredApply,
            CommandName::PolicyCheck | CommandName::ApprovePolicies if ok => {
                ProjectPlanStatus::PassedPolicy
            }
            CommandName::PolicyCheck | CommandName::ApprovePolicies => {
                ProjectPlanStatus::ErroredPolicy
            }
            CommandName::Version => return None,
        };
        Some(status)
    }

    pub fn to_project_status(&self) -> Option<ProjectStatus> {
        self.plan_status().map(|status| {
            ProjectStatus::new(
                self.repo_rel_dir.clone(),
                self.workspace.clone(),
                self.project_name.clone(),
                status,
            )
        })
    }
}

/// Aggregate outcome of one command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub project_results: Vec<ProjectResult>,
    /// Set when the command failed before any project ran.
    pub error: Option<String>,
    pub failure: Option<String>,
    /// Plans were deleted because automerge requires every plan to succeed.
    pub plans_deleted: bool,
}

impl CommandResult {
    pub fn from_results(project_results: Vec<ProjectResult>) -> Self {
        Self {
            project_results,
            ..Self::default()
        }
    }

    pub fn from_error(err: impl Into<String>) -> Self {
        Self {
            error: Some(err.into()),
            ..Self::default()
        }
    }

    pub fn from_failure(msg: impl Into<String>) -> Self {
        Self {
            failure: Some(msg.into()),
            ..Self::default()
        }
    }

    pub fn has_errors(&self) -> bool {
        self.error.is_some()
            || self.failure.is_some()
            || self.project_results.iter().any(ProjectResult::is_errored)
    }

    pub fn project_statuses(&self) -> Vec<ProjectStatus> {
        self.project_results
            .iter()
            .filter_map(ProjectResult::to_project_status)
            .collect()
    }
}
