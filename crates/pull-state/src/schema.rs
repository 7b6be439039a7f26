//! Pull status schema and merge rules.
//!
//! A [`PullStatus`] is the persisted aggregate for one pull request: the last
//! known outcome of every project that any command has touched, plus the time
//! of the last write. Stores call [`PullStatus::merge`] so every backend
//! applies identical update semantics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a pull request across VCS hosts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PullKey {
    /// VCS host label, e.g. `github`.
    pub host: String,
    /// `owner/name` of the base repository.
    pub repo_full_name: String,
    /// Pull request number.
    pub num: u64,
}

impl PullKey {
    pub fn new(host: impl Into<String>, repo_full_name: impl Into<String>, num: u64) -> Self {
        Self {
            host: host.into(),
            repo_full_name: repo_full_name.into(),
            num,
        }
    }
}

impl std::fmt::Display for PullKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.host, self.repo_full_name, self.num)
    }
}

/// Last known command outcome for one project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectPlanStatus {
    Planned,
    ErroredPlan,
    PassedPolicy,
    ErroredPolicy,
    Applied,
    ErroredApply,
}

impl ProjectPlanStatus {
    /// True for the three errored variants.
    pub fn is_errored(self) -> bool {
        matches!(
            self,
            ProjectPlanStatus::ErroredPlan
                | ProjectPlanStatus::ErroredPolicy
                | ProjectPlanStatus::ErroredApply
        )
    }
}

impl std::fmt::Display for ProjectPlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProjectPlanStatus::Planned => "planned",
            ProjectPlanStatus::ErroredPlan => "plan_errored",
            ProjectPlanStatus::PassedPolicy => "policy_passed",
            ProjectPlanStatus::ErroredPolicy => "policy_errored",
            ProjectPlanStatus::Applied => "applied",
            ProjectPlanStatus::ErroredApply => "apply_errored",
        };
        f.write_str(s)
    }
}

/// Status entry for a single project within a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStatus {
    /// Directory relative to the repository root.
    pub repo_rel_dir: String,
    /// Terraform workspace.
    pub workspace: String,
    /// Project name; empty for unnamed projects.
    #[serde(default)]
    pub project_name: String,
    pub status: ProjectPlanStatus,
}

impl ProjectStatus {
    pub fn new(
        repo_rel_dir: impl Into<String>,
        workspace: impl Into<String>,
        project_name: impl Into<String>,
        status: ProjectPlanStatus,
    ) -> Self {
        Self {
            repo_rel_dir: repo_rel_dir.into(),
            workspace: workspace.into(),
            project_name: project_name.into(),
            status,
        }
    }

    fn same_project(&self, other: &ProjectStatus) -> bool {
        self.repo_rel_dir == other.repo_rel_dir
            && self.workspace == other.workspace
            && self.project_name == other.project_name
    }
}

/// Persisted aggregate status for one pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullStatus {
    pub pull: PullKey,
    /// Head commit the entries were produced against.
    pub head_commit: String,
    pub projects: Vec<ProjectStatus>,
    /// Time of the last successful write.
    pub updated_at: DateTime<Utc>,
}

impl PullStatus {
    /// Merge `updates` into `prior`, producing the status to persist.
    ///
    /// Entries are keyed by (dir, workspace, project name). Projects absent
    /// from `updates` keep their prior entry. If `prior` was recorded against
    /// a different head commit it is discarded entirely.
    pub fn merge(
        prior: Option<PullStatus>,
        pull: &PullKey,
        head_commit: &str,
        updates: Vec<ProjectStatus>,
        now: DateTime<Utc>,
    ) -> PullStatus {
        let mut projects = match prior {
            Some(p) if p.head_commit == head_commit => p.projects,
            _ => Vec::new(),
        };

        for update in updates {
            match projects.iter_mut().find(|p| p.same_project(&update)) {
                Some(existing) => existing.status = update.status,
                None => projects.push(update),
            }
        }

        PullStatus {
            pull: pull.clone(),
            head_commit: head_commit.to_string(),
            projects,
            updated_at: now,
        }
    }

    /// Number of projects currently in `status`.
    pub fn status_count(&self, status: ProjectPlanStatus) -> usize {
        self.projects.iter().filter(|p| p.status == status).count()
    }

    /// True when every tracked project has been applied.
    ///
    /// An empty status is never considered fully applied.
    pub fn all_applied(&self) -> bool {
        !self.projects.is_empty()
            && self
                .projects
                .iter()
                .all(|p| p.status == ProjectPlanStatus::Applied)
    }
}
