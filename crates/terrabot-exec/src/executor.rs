//! [`ProjectExecutor`] that runs a unit's workflow steps as child processes
//! inside the project's checkout.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use terrabot_core::{
    ApplyRequirement, CommandName, ProjectExecutor, ProjectResult, ProjectSuccess, ProjectUnit,
};
use tracing::{debug, warn};

use crate::config::ExecConfig;
use crate::error::{ExecError, Result};
use crate::locker::WorkspaceLocker;
use crate::paths;
use crate::step::run_step;

pub const NOT_MERGEABLE_MSG: &str = "Pull request must be mergeable before running apply.";

/// How a sequence of steps ended.
#[derive(Debug)]
enum StepsOutcome {
    /// Every step exited zero; concatenated stdout.
    Passed(String),
    /// A step exited non-zero; its failure message.
    Failed(String),
}

pub struct StepProjectExecutor {
    config: Arc<ExecConfig>,
    locker: WorkspaceLocker,
}

impl StepProjectExecutor {
    pub fn new(config: Arc<ExecConfig>, locker: WorkspaceLocker) -> Self {
        Self { config, locker }
    }

    pub fn locker(&self) -> &WorkspaceLocker {
        &self.locker
    }

    /// Lock the workspace, resolve the project directory, then hand off to
    /// the command-specific body. Errors from either become error outcomes.
    async fn execute(&self, unit: &ProjectUnit) -> ProjectResult {
        let _lock = match self.locker.try_lock(WorkspaceLocker::key_for(unit)) {
            Ok(lock) => lock,
            Err(e) => return ProjectResult::error(unit, e.to_string()),
        };
        let dir = paths::project_dir(&self.config.data_dir, unit);
        if !dir.is_dir() {
            return ProjectResult::error(unit, ExecError::MissingCheckout(dir).to_string());
        }
        let plan = paths::plan_file(&dir, unit);

        let result = match unit.command {
            CommandName::Plan => self.plan_in(unit, &dir, &plan).await,
            CommandName::Apply => self.apply_in(unit, &dir, &plan).await,
            CommandName::PolicyCheck => self.policy_check_in(unit, &dir, &plan).await,
            CommandName::ApprovePolicies => Ok(approve_in(unit, &plan)),
            CommandName::Version => self.version_in(unit, &dir, &plan).await,
        };
        result.unwrap_or_else(|e| ProjectResult::error(unit, e.to_string()))
    }

    async fn plan_in(&self, unit: &ProjectUnit, dir: &Path, plan: &Path) -> Result<ProjectResult> {
        if plan.exists() {
            tokio::fs::remove_file(plan).await?;
        }
        let steps = with_trailing_args(&unit.steps, &unit.flags);
        Ok(match self.run_steps(unit, dir, plan, &steps).await? {
            StepsOutcome::Passed(stdout) => {
                let (summary, has_changes) = summarize_plan(&stdout);
                ProjectResult::success(
                    unit,
                    ProjectSuccess::Plan {
                        summary,
                        has_changes,
                    },
                )
            }
            StepsOutcome::Failed(msg) => ProjectResult::failure(unit, msg),
        })
    }

    async fn apply_in(&self, unit: &ProjectUnit, dir: &Path, plan: &Path) -> Result<ProjectResult> {
        if !plan.exists() {
            return Ok(ProjectResult::failure(
                unit,
                format!("no plan found for {}; run plan first", unit.display_name()),
            ));
        }
        if let Some(msg) = unmet_requirement(unit) {
            return Ok(ProjectResult::failure(unit, msg));
        }

        let steps = with_trailing_args(&unit.steps, &unit.flags);
        Ok(match self.run_steps(unit, dir, plan, &steps).await? {
            StepsOutcome::Passed(output) => {
                if let Err(e) = tokio::fs::remove_file(plan).await {
                    warn!(
                        project = %unit.display_name(),
                        plan = %plan.display(),
                        error = %e,
                        "applied but unable to remove plan file"
                    );
                }
                ProjectResult::success(unit, ProjectSuccess::Apply { output })
            }
            StepsOutcome::Failed(msg) => ProjectResult::failure(unit, msg),
        })
    }

    async fn policy_check_in(
        &self,
        unit: &ProjectUnit,
        dir: &Path,
        plan: &Path,
    ) -> Result<ProjectResult> {
        if !plan.exists() {
            return Ok(ProjectResult::failure(
                unit,
                format!("no plan found for {}; run plan first", unit.display_name()),
            ));
        }
        let policy_args: Vec<String> = unit
            .policy_sets
            .iter()
            .flat_map(|set| ["--policy".to_string(), set.clone()])
            .collect();
        let steps = with_trailing_args(&unit.steps, &policy_args);
        Ok(match self.run_steps(unit, dir, plan, &steps).await? {
            StepsOutcome::Passed(output) => {
                ProjectResult::success(unit, ProjectSuccess::PolicyCheck { output })
            }
            StepsOutcome::Failed(msg) => ProjectResult::failure(unit, msg),
        })
    }

    async fn version_in(&self, unit: &ProjectUnit, dir: &Path, plan: &Path) -> Result<ProjectResult> {
        Ok(match self.run_steps(unit, dir, plan, &unit.steps).await? {
            StepsOutcome::Passed(output) => ProjectResult::success(
                unit,
                ProjectSuccess::Version {
                    output: output.trim().to_string(),
                },
            ),
            StepsOutcome::Failed(msg) => ProjectResult::failure(unit, msg),
        })
    }

    async fn run_steps(
        &self,
        unit: &ProjectUnit,
        dir: &Path,
        plan: &Path,
        steps: &[Vec<String>],
    ) -> Result<StepsOutcome> {
        let vars = Placeholders::new(unit, dir, plan);
        let env = step_env(unit, dir, plan);
        let mut stdout = String::new();

        for (index, step) in steps.iter().enumerate() {
            let argv: Vec<String> = step.iter().map(|arg| vars.expand(arg)).collect();
            let output =
                run_step(index, &argv, dir, &env, self.config.step_timeout_secs).await?;
            if !output.passed() {
                warn!(
                    project = %unit.display_name(),
                    program = %output.program,
                    exit_code = output.exit_code,
                    "workflow step failed"
                );
                return Ok(StepsOutcome::Failed(output.failure_message()));
            }
            stdout.push_str(&output.stdout);
        }
        debug!(project = %unit.display_name(), steps = steps.len(), "workflow steps passed");
        Ok(StepsOutcome::Passed(stdout))
    }
}

fn approve_in(unit: &ProjectUnit, plan: &Path) -> ProjectResult {
    if plan.exists() {
        ProjectResult::success(unit, ProjectSuccess::ApprovePolicies)
    } else {
        ProjectResult::failure(
            unit,
            format!("no plan found for {}; nothing to approve", unit.display_name()),
        )
    }
}

/// The first apply requirement the unit doesn't meet, unless forced.
///
/// Only `mergeable` is known at this layer; `approved` and `undiverged` are
/// left to the VCS host's branch protection.
fn unmet_requirement(unit: &ProjectUnit) -> Option<String> {
    if unit.force_apply {
        return None;
    }
    for req in &unit.apply_requirements {
        match req {
            ApplyRequirement::Mergeable if !unit.pull_mergeable => {
                return Some(NOT_MERGEABLE_MSG.to_string())
            }
            ApplyRequirement::Approved | ApplyRequirement::Undiverged => {
                debug!(requirement = ?req, "apply requirement delegated to vcs host");
            }
            ApplyRequirement::Mergeable => {}
        }
    }
    None
}

/// Append `args` to the last step.
fn with_trailing_args(steps: &[Vec<String>], args: &[String]) -> Vec<Vec<String>> {
    let mut steps = steps.to_vec();
    if let Some(last) = steps.last_mut() {
        last.extend(args.iter().cloned());
    }
    steps
}

/// Terraform's own summary line, and whether the plan changes anything.
pub fn summarize_plan(stdout: &str) -> (String, bool) {
    let no_changes = stdout.contains("No changes.");
    let summary = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| line.starts_with("Plan:") || line.starts_with("No changes."))
        .unwrap_or("Plan complete.")
        .to_string();
    (summary, !no_changes)
}

struct Placeholders {
    pairs: [(&'static str, String); 4],
}

impl Placeholders {
    fn new(unit: &ProjectUnit, dir: &Path, plan: &Path) -> Self {
        Self {
            pairs: [
                ("{plan}", path_str(plan)),
                ("{dir}", path_str(dir)),
                ("{workspace}", unit.workspace.clone()),
                ("{project}", unit.project_name.clone()),
            ],
        }
    }

    fn expand(&self, arg: &str) -> String {
        self.pairs
            .iter()
            .fold(arg.to_string(), |acc, (from, to)| acc.replace(from, to))
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn step_env(unit: &ProjectUnit, dir: &Path, plan: &Path) -> Vec<(String, String)> {
    let pairs: [(&str, String); 9] = [
        ("TF_WORKSPACE", unit.workspace.clone()),
        ("WORKSPACE", unit.workspace.clone()),
        ("DIR", path_str(dir)),
        ("REPO_REL_DIR", unit.repo_rel_dir.clone()),
        ("PLANFILE", path_str(plan)),
        ("PROJECT_NAME", unit.project_name.clone()),
        ("PULL_NUM", unit.pull.num.to_string()),
        ("HEAD_COMMIT", unit.pull.head_commit.clone()),
        ("USER_NAME", unit.user.username.clone()),
    ];
    let mut env: Vec<(String, String)> = pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    env.push(("COMMENT_ARGS".to_string(), unit.flags.join(",")));
    env
}

#[async_trait]
impl ProjectExecutor for StepProjectExecutor {
    async fn plan(&self, unit: &ProjectUnit) -> ProjectResult {
        self.execute(&unit.clone().with_command(CommandName::Plan)).await
    }

    async fn apply(&self, unit: &ProjectUnit) -> ProjectResult {
        self.execute(&unit.clone().with_command(CommandName::Apply)).await
    }

    async fn policy_check(&self, unit: &ProjectUnit) -> ProjectResult {
        self.execute(&unit.clone().with_command(CommandName::PolicyCheck))
            .await
    }

    async fn approve_policies(&self, unit: &ProjectUnit) -> ProjectResult {
        self.execute(&unit.clone().with_command(CommandName::ApprovePolicies))
            .await
    }

    async fn version(&self, unit: &ProjectUnit) -> ProjectResult {
        self.execute(&unit.clone().with_command(CommandName::Version))
            .await
    }
}

/// Create the project directory for `unit`, as a checkout step would.
pub async fn prepare_project_dir(data_dir: &Path, unit: &ProjectUnit) -> Result<PathBuf> {
    let dir = paths::project_dir(data_dir, unit);
    tokio::fs::create_dir_all(&dir).await?;
    Ok(dir)
}
