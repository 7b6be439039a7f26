//! Project units: one (dir, workspace, project) scope a command runs against.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::command::CommandName;
use super::event::{EventContext, PullRequest, User};

/// Conditions that must hold before a project may be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyRequirement {
    Approved,
    Mergeable,
    Undiverged,
}

/// A single unit of work produced by a [`ProjectUnitBuilder`] and consumed
/// exactly once by a [`ProjectExecutor`].
///
/// [`ProjectUnitBuilder`]: crate::collaborators::ProjectUnitBuilder
/// [`ProjectExecutor`]: crate::collaborators::ProjectExecutor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectUnit {
    pub command: CommandName,
    pub repo_rel_dir: String,
    pub workspace: String,
    /// Empty for unnamed projects.
    pub project_name: String,
    /// Workflow steps resolved by the builder, each an argv list.
    pub steps: Vec<Vec<String>>,
    pub apply_requirements: Vec<ApplyRequirement>,
    pub policy_sets: Vec<String>,
    pub parallel_plan: bool,
    pub parallel_apply: bool,
    pub force_apply: bool,
    pub pull_mergeable: bool,
    /// Extra arguments from the triggering comment.
    pub flags: Vec<String>,
    pub correlation_id: Uuid,
    pub pull: PullRequest,
    pub user: User,
}

impl ProjectUnit {
    pub fn new(
        command: CommandName,
        ctx: &EventContext,
        repo_rel_dir: impl Into<String>,
        workspace: impl Into<String>,
    ) -> Self {
        Self {
            command,
            repo_rel_dir: repo_rel_dir.into(),
            workspace: workspace.into(),
            project_name: String::new(),
            steps: Vec::new(),
            apply_requirements: Vec::new(),
            policy_sets: Vec::new(),
            parallel_plan: false,
            parallel_apply: false,
            force_apply: false,
            pull_mergeable: ctx.pull_mergeable,
            flags: Vec::new(),
            correlation_id: Uuid::new_v4(),
            pull: ctx.pull.clone(),
            user: ctx.user.clone(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.project_name = name.into();
        self
    }

    pub fn with_parallel(mut self, plan: bool, apply: bool) -> Self {
        self.parallel_plan = plan;
        self.parallel_apply = apply;
        self
    }

    pub fn with_steps(mut self, steps: Vec<Vec<String>>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_command(mut self, command: CommandName) -> Self {
        self.command = command;
        self
    }

    /// Project name if set, else `dir/workspace`.
    pub fn display_name(&self) -> String {
        if self.project_name.is_empty() {
            format!("{}/{}", self.repo_rel_dir, self.workspace)
        } else {
            self.project_name.clone()
        }
    }
}
