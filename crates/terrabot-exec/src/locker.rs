//! In-memory try-locks keyed by (repo, pull, workspace, dir).
//!
//! Two commands on the same workspace of the same project would race on its
//! plan file and Terraform state, so the second one fails fast instead of
//! waiting.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use terrabot_core::ProjectUnit;

use crate::error::{ExecError, Result};

#[derive(Debug, Clone, Default)]
pub struct WorkspaceLocker {
    held: Arc<Mutex<HashSet<String>>>,
}

impl WorkspaceLocker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(repo_full_name: &str, pull_num: u64, workspace: &str, dir: &str) -> String {
        format!("{repo_full_name}#{pull_num}/{workspace}/{dir}")
    }

    pub fn key_for(unit: &ProjectUnit) -> String {
        Self::key(
            &unit.pull.base_repo.full_name,
            unit.pull.num,
            &unit.workspace,
            &unit.repo_rel_dir,
        )
    }

    /// Take the lock or fail immediately. Released when the guard drops.
    pub fn try_lock(&self, key: String) -> Result<WorkspaceLock> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if !held.insert(key.clone()) {
            return Err(ExecError::Locked(key));
        }
        Ok(WorkspaceLock {
            key,
            held: Arc::clone(&self.held),
        })
    }

    pub fn is_locked(&self, key: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key)
    }
}

#[derive(Debug)]
pub struct WorkspaceLock {
    key: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl WorkspaceLock {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}
