//! [`ProjectUnitBuilder`] backed by the `[[exec.projects]]` list.

use std::sync::Arc;

use async_trait::async_trait;
use terrabot_core::{
    CollaboratorError, CollaboratorResult, CommandName, CommentCommand, EventContext,
    ProjectUnit, ProjectUnitBuilder,
};
use tracing::debug;

use crate::config::{default_workspace, ExecConfig, ProjectConfig};

pub struct ConfiguredUnitBuilder {
    config: Arc<ExecConfig>,
}

impl ConfiguredUnitBuilder {
    pub fn new(config: Arc<ExecConfig>) -> Self {
        Self { config }
    }

    /// Projects a comment targets. A `-p` naming an unknown project is an
    /// error; a `-d`/`-w` that matches nothing targets that directory
    /// directly.
    fn select(&self, cmd: &CommentCommand) -> CollaboratorResult<Vec<ProjectConfig>> {
        if let Some(name) = &cmd.project_name {
            let found: Vec<_> = self
                .config
                .projects
                .iter()
                .filter(|p| p.name.as_deref() == Some(name.as_str()))
                .cloned()
                .collect();
            if found.is_empty() {
                return Err(CollaboratorError::Builder(format!(
                    "no project named {name:?} is configured"
                )));
            }
            return Ok(found);
        }

        let dir = cmd.repo_rel_dir.as_deref().map(normalize_dir);
        let workspace = cmd.workspace.as_deref();
        let found: Vec<_> = self
            .config
            .projects
            .iter()
            .filter(|p| dir.as_deref().map_or(true, |d| normalize_dir(&p.dir) == d))
            .filter(|p| workspace.map_or(true, |w| p.workspace == w))
            .cloned()
            .collect();

        if found.is_empty() && cmd.is_for_specific_project() {
            let dir = dir.unwrap_or_else(|| ".".to_string());
            let workspace = workspace.map_or_else(default_workspace, str::to_string);
            debug!(%dir, %workspace, "targeting unconfigured directory");
            return Ok(vec![ProjectConfig::ad_hoc(dir, workspace)]);
        }
        Ok(found)
    }

    fn unit(
        &self,
        command: CommandName,
        ctx: &EventContext,
        project: &ProjectConfig,
        cmd: Option<&CommentCommand>,
    ) -> CollaboratorResult<ProjectUnit> {
        let workflow = self
            .config
            .workflow(project.workflow.as_deref())
            .map_err(|e| CollaboratorError::Builder(e.to_string()))?;
        let mut unit = ProjectUnit::new(command, ctx, normalize_dir(&project.dir), &project.workspace)
            .with_parallel(project.parallel_plan, project.parallel_apply)
            .with_steps(workflow.steps_for(command));
        if let Some(name) = &project.name {
            unit = unit.named(name);
        }
        unit.policy_sets = project.policy_sets.clone();
        unit.apply_requirements = project.apply_requirements.clone();
        if let Some(cmd) = cmd {
            unit.flags = cmd.flags.clone();
            unit.force_apply = cmd.force_apply;
        }
        Ok(unit)
    }

    /// Plan units, each followed by its policy-check unit when enabled.
    fn plan_units(
        &self,
        ctx: &EventContext,
        projects: &[ProjectConfig],
        cmd: Option<&CommentCommand>,
    ) -> CollaboratorResult<Vec<ProjectUnit>> {
        let mut units = Vec::with_capacity(projects.len() * 2);
        for project in projects {
            units.push(self.unit(CommandName::Plan, ctx, project, cmd)?);
        }
        if self.config.policy_check {
            for project in projects {
                units.push(self.unit(CommandName::PolicyCheck, ctx, project, cmd)?);
            }
        }
        Ok(units)
    }

    fn units_for(
        &self,
        command: CommandName,
        ctx: &EventContext,
        cmd: &CommentCommand,
    ) -> CollaboratorResult<Vec<ProjectUnit>> {
        self.select(cmd)?
            .iter()
            .map(|p| self.unit(command, ctx, p, Some(cmd)))
            .collect()
    }
}

/// `./net/` and `net` are the same project directory; empty means the root.
pub fn normalize_dir(dir: &str) -> String {
    let trimmed = dir.trim().trim_start_matches("./").trim_end_matches('/');
    if trimmed.is_empty() {
        ".".to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl ProjectUnitBuilder for ConfiguredUnitBuilder {
    async fn build_autoplan_units(&self, ctx: &EventContext) -> CollaboratorResult<Vec<ProjectUnit>> {
        let projects: Vec<_> = self
            .config
            .projects
            .iter()
            .filter(|p| p.autoplan)
            .cloned()
            .collect();
        self.plan_units(ctx, &projects, None)
    }

    async fn build_plan_units(
        &self,
        ctx: &EventContext,
        cmd: &CommentCommand,
    ) -> CollaboratorResult<Vec<ProjectUnit>> {
        let projects = self.select(cmd)?;
        self.plan_units(ctx, &projects, Some(cmd))
    }

    async fn build_apply_units(
        &self,
        ctx: &EventContext,
        cmd: &CommentCommand,
    ) -> CollaboratorResult<Vec<ProjectUnit>> {
        self.units_for(CommandName::Apply, ctx, cmd)
    }

    async fn build_approve_policies_units(
        &self,
        ctx: &EventContext,
        cmd: &CommentCommand,
    ) -> CollaboratorResult<Vec<ProjectUnit>> {
        self.units_for(CommandName::ApprovePolicies, ctx, cmd)
    }

    async fn build_version_units(
        &self,
        ctx: &EventContext,
        cmd: &CommentCommand,
    ) -> CollaboratorResult<Vec<ProjectUnit>> {
        self.units_for(CommandName::Version, ctx, cmd)
    }
}
