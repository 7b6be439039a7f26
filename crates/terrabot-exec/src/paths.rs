//! On-disk layout under the data directory.

use std::path::{Path, PathBuf};

use terrabot_core::{ProjectUnit, Repo};

/// `<data_dir>/repos/<owner>/<name>/<pull>`
pub fn checkout_dir(data_dir: &Path, repo: &Repo, pull_num: u64) -> PathBuf {
    data_dir
        .join("repos")
        .join(&repo.owner)
        .join(&repo.name)
        .join(pull_num.to_string())
}

/// `<checkout>/<workspace>/<dir>`
pub fn project_dir(data_dir: &Path, unit: &ProjectUnit) -> PathBuf {
    let base = checkout_dir(data_dir, &unit.pull.base_repo, unit.pull.num).join(&unit.workspace);
    match unit.repo_rel_dir.as_str() {
        "." | "" => base,
        dir => base.join(dir),
    }
}

/// Plan file for a unit inside its project directory.
pub fn plan_file(project_dir: &Path, unit: &ProjectUnit) -> PathBuf {
    let stem = if unit.project_name.is_empty() {
        unit.workspace.clone()
    } else {
        format!("{}-{}", unit.project_name.replace('/', "_"), unit.workspace)
    };
    project_dir.join(format!("{stem}.tfplan"))
}
