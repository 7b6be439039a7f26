//! Running a single argv step as a child process.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::debug;

use crate::error::{ExecError, Result};

/// Captured result of one step.
#[derive(Debug, Clone)]
pub struct StepOutput {
    pub program: String,

    /// Exit code, `-1` when killed by a signal.
    pub exit_code: i32,

    pub stdout: String,

    pub stderr: String,

    pub duration_ms: u64,

    pub success: bool,
}

impl StepOutput {
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }

    /// What to show the user when the step failed: stderr, or stdout when
    /// the program wrote its error there.
    pub fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Run `argv` in `cwd` with extra environment. A `timeout_secs` of zero waits
/// indefinitely; otherwise the child is killed once the limit passes.
pub async fn run_step(
    index: usize,
    argv: &[String],
    cwd: &Path,
    env: &[(String, String)],
    timeout_secs: u64,
) -> Result<StepOutput> {
    let start = Instant::now();

    let Some((program, args)) = argv.split_first() else {
        return Err(ExecError::EmptyCommand { index });
    };

    let child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ExecError::Spawn {
            program: program.clone(),
            source,
        })?;

    let output = if timeout_secs > 0 {
        tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| ExecError::Timeout {
            program: program.clone(),
            secs: timeout_secs,
        })??
    } else {
        child.wait_with_output().await?
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    let exit_code = output.status.code().unwrap_or(-1);
    debug!(program = %program, exit_code, duration_ms, "step finished");

    Ok(StepOutput {
        program: program.clone(),
        exit_code,
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration_ms,
        success: output.status.success(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_run_captures_stdout_and_env() {
        let dir = tempfile::tempdir().unwrap();
        let env = vec![("GREETING".to_string(), "hello".to_string())];
        let out = run_step(0, &sh("echo $GREETING; pwd"), dir.path(), &env, 60)
            .await
            .unwrap();
        assert!(out.passed());
        assert!(out.stdout.contains("hello"));
        let cwd = dir.path().canonicalize().unwrap();
        assert!(out.stdout.contains(cwd.to_str().unwrap()));
    }

    #[tokio::test]
    async fn test_failing_step_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_step(0, &sh("echo boom >&2; exit 3"), dir.path(), &[], 60)
            .await
            .unwrap();
        assert!(!out.passed());
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.failure_message(), "boom");
    }

    #[tokio::test]
    async fn test_failure_message_falls_back_to_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_step(0, &sh("echo only-stdout; exit 1"), dir.path(), &[], 60)
            .await
            .unwrap();
        assert_eq!(out.failure_message(), "only-stdout");
    }

    #[tokio::test]
    async fn test_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_step(0, &sh("sleep 5"), dir.path(), &[], 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Timeout { secs: 1, .. }));
    }

    #[tokio::test]
    async fn test_empty_and_missing_programs() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            run_step(2, &[], dir.path(), &[], 60).await,
            Err(ExecError::EmptyCommand { index: 2 })
        ));
        let missing = vec!["definitely-not-a-real-program-xyz".to_string()];
        assert!(matches!(
            run_step(0, &missing, dir.path(), &[], 60).await,
            Err(ExecError::Spawn { .. })
        ));
    }
}
