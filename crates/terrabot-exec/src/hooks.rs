//! Pre- and post-workflow hooks run as shell commands in the pull's checkout.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use terrabot_core::{
    CollaboratorError, CollaboratorResult, CommandName, EventContext, PostWorkflowHookRunner,
    PreWorkflowHookRunner,
};
use tracing::{debug, info};

use crate::config::ExecConfig;
use crate::paths;
use crate::step::run_step;

#[derive(Debug, Clone)]
pub struct ShellHookRunner {
    data_dir: PathBuf,
    pre: Vec<Vec<String>>,
    post: Vec<Vec<String>>,
    timeout_secs: u64,
}

impl ShellHookRunner {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        pre: Vec<Vec<String>>,
        post: Vec<Vec<String>>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            pre,
            post,
            timeout_secs,
        }
    }

    pub fn from_config(config: &ExecConfig) -> Self {
        Self::new(
            config.data_dir.clone(),
            config.pre_workflow_hooks.clone(),
            config.post_workflow_hooks.clone(),
            config.step_timeout_secs,
        )
    }

    async fn run_hooks(
        &self,
        kind: &str,
        hooks: &[Vec<String>],
        ctx: &EventContext,
        command: Option<CommandName>,
    ) -> CollaboratorResult<()> {
        if hooks.is_empty() {
            return Ok(());
        }
        let dir = paths::checkout_dir(&self.data_dir, &ctx.base_repo, ctx.pull.num);
        tokio::fs::create_dir_all(&dir).await?;
        let env = hook_env(ctx, command);

        for (index, hook) in hooks.iter().enumerate() {
            let output = run_step(index, hook, &dir, &env, self.timeout_secs)
                .await
                .map_err(|e| CollaboratorError::Hook(format!("{kind} hook {index}: {e}")))?;
            if !output.passed() {
                return Err(CollaboratorError::Hook(format!(
                    "{kind} hook {} exited with {}: {}",
                    output.program,
                    output.exit_code,
                    output.failure_message()
                )));
            }
            debug!(kind, program = %output.program, "workflow hook passed");
        }
        info!(kind, count = hooks.len(), dir = %self::display(&dir), "workflow hooks finished");
        Ok(())
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn hook_env(ctx: &EventContext, command: Option<CommandName>) -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = [
        ("BASE_REPO_OWNER", ctx.base_repo.owner.clone()),
        ("BASE_REPO_NAME", ctx.base_repo.name.clone()),
        ("HEAD_REPO_OWNER", ctx.head_repo.owner.clone()),
        ("HEAD_REPO_NAME", ctx.head_repo.name.clone()),
        ("HEAD_BRANCH_NAME", ctx.pull.head_branch.clone()),
        ("BASE_BRANCH_NAME", ctx.pull.base_branch.clone()),
        ("HEAD_COMMIT", ctx.pull.head_commit.clone()),
        ("PULL_NUM", ctx.pull.num.to_string()),
        ("PULL_AUTHOR", ctx.pull.author.clone()),
        ("USER_NAME", ctx.user.username.clone()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    if let Some(command) = command {
        env.push(("COMMAND_NAME".to_string(), command.as_str().to_string()));
    }
    env
}

#[async_trait]
impl PreWorkflowHookRunner for ShellHookRunner {
    async fn run_pre_hooks(&self, ctx: &EventContext) -> CollaboratorResult<()> {
        self.run_hooks("pre-workflow", &self.pre, ctx, None).await
    }
}

#[async_trait]
impl PostWorkflowHookRunner for ShellHookRunner {
    async fn run_post_hooks(
        &self,
        ctx: &EventContext,
        command: CommandName,
    ) -> CollaboratorResult<()> {
        self.run_hooks("post-workflow", &self.post, ctx, Some(command))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrabot_core::fakes;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_pre_hooks_run_in_checkout() {
        let data = tempfile::tempdir().unwrap();
        let hooks = ShellHookRunner::new(
            data.path(),
            vec![sh("echo $PULL_NUM-$HEAD_COMMIT > hook.out")],
            vec![],
            30,
        );
        let ctx = fakes::event_context();
        hooks.run_pre_hooks(&ctx).await.unwrap();

        let checkout = paths::checkout_dir(data.path(), &ctx.base_repo, ctx.pull.num);
        let written = std::fs::read_to_string(checkout.join("hook.out")).unwrap();
        assert_eq!(written.trim(), "1-abc123");
    }

    #[tokio::test]
    async fn test_post_hooks_see_command_name() {
        let data = tempfile::tempdir().unwrap();
        let hooks = ShellHookRunner::new(
            data.path(),
            vec![],
            vec![sh("test \"$COMMAND_NAME\" = apply")],
            30,
        );
        hooks
            .run_post_hooks(&fakes::event_context(), CommandName::Apply)
            .await
            .unwrap();
        assert!(hooks
            .run_post_hooks(&fakes::event_context(), CommandName::Plan)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_failing_hook_stops_the_rest() {
        let data = tempfile::tempdir().unwrap();
        let hooks = ShellHookRunner::new(
            data.path(),
            vec![sh("echo nope >&2; exit 2"), sh("touch second")],
            vec![],
            30,
        );
        let ctx = fakes::event_context();
        let err = hooks.run_pre_hooks(&ctx).await.unwrap_err();
        match err {
            CollaboratorError::Hook(msg) => {
                assert!(msg.contains("exited with 2"), "{msg}");
                assert!(msg.contains("nope"), "{msg}");
            }
            other => panic!("unexpected {other:?}"),
        }
        let checkout = paths::checkout_dir(data.path(), &ctx.base_repo, ctx.pull.num);
        assert!(!checkout.join("second").exists());
    }

    #[tokio::test]
    async fn test_no_hooks_is_noop() {
        let data = tempfile::tempdir().unwrap();
        let hooks = ShellHookRunner::from_config(&ExecConfig {
            data_dir: data.path().to_path_buf(),
            ..ExecConfig::default()
        });
        hooks.run_pre_hooks(&fakes::event_context()).await.unwrap();
        assert!(!data.path().join("repos").exists());
    }
}
