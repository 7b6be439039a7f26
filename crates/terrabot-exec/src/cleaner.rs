//! Removes plan files once a pull request no longer needs them.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use terrabot_core::{CollaboratorError, CollaboratorResult, PlanCleaner, PullRequest, Repo};
use tracing::debug;

use crate::paths;

#[derive(Debug, Clone)]
pub struct PlanFileCleaner {
    data_dir: PathBuf,
}

impl PlanFileCleaner {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

/// Delete every `*.tfplan` under `root`, returning how many were removed.
/// A missing root has nothing to delete.
fn remove_plans(root: &Path) -> io::Result<usize> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            removed += remove_plans(&path)?;
        } else if path.extension().is_some_and(|ext| ext == "tfplan") {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[async_trait]
impl PlanCleaner for PlanFileCleaner {
    async fn delete_plans(&self, repo: &Repo, pull: &PullRequest) -> CollaboratorResult<()> {
        let root = paths::checkout_dir(&self.data_dir, repo, pull.num);
        let removed = tokio::task::spawn_blocking(move || remove_plans(&root))
            .await
            .map_err(|e| CollaboratorError::Cleanup(e.to_string()))??;
        debug!(repo = %repo.full_name, pull = pull.num, removed, "deleted plan files");
        Ok(())
    }
}
