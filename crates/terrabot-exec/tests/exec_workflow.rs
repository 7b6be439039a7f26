//! The engine driving real workflow steps through the exec collaborators.

use std::path::Path;
use std::sync::Arc;

use pull_state::{ProjectPlanStatus, PullStatusStore};
use terrabot_core::fakes::{self, Harness};
use terrabot_core::{
    Collaborators, CommandName, CommandRunner, CommentCommand, Drainer, EngineConfig,
    EventOutcome, Metrics, ProjectOutcome,
};
use terrabot_exec::{
    paths, ConfiguredUnitBuilder, ExecConfig, PlanFileCleaner, ProjectConfig, ShellHookRunner,
    StepProjectExecutor, Workflow, WorkspaceLocker,
};

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

fn exec_config(data_dir: &Path) -> ExecConfig {
    let workflow = Workflow {
        plan: vec![sh(
            "echo planned > {plan}; echo 'Plan: 1 to add, 0 to change, 0 to destroy.'",
        )],
        apply: vec![sh("cat {plan} > applied.txt; echo 'Apply complete!'")],
        policy_check: vec![sh("echo 'policies passed'")],
        version: vec![sh("echo 'Terraform v1.9.0'")],
    };
    let mut config: ExecConfig = toml::from_str(
        r#"
        step_timeout_secs = 30

        [[projects]]
        name = "net"
        dir = "net"

        [[projects]]
        name = "db"
        dir = "db"
        parallel_plan = true
        "#,
    )
    .expect("valid exec config");
    config.data_dir = data_dir.to_path_buf();
    config.workflows.insert("default".to_string(), workflow);
    config.pre_workflow_hooks = vec![sh("mkdir -p default/net default/db")];
    config
}

fn runner(h: &Harness, exec: ExecConfig) -> CommandRunner {
    let exec = Arc::new(exec);
    let hooks = Arc::new(ShellHookRunner::from_config(&exec));
    let collaborators = Collaborators {
        vcs: h.vcs.clone(),
        status: h.status.clone(),
        builder: Arc::new(ConfiguredUnitBuilder::new(Arc::clone(&exec))),
        executor: Arc::new(StepProjectExecutor::new(
            Arc::clone(&exec),
            WorkspaceLocker::new(),
        )),
        store: h.store.clone(),
        pre_hooks: hooks.clone(),
        post_hooks: hooks,
        plan_cleaner: Arc::new(PlanFileCleaner::new(exec.data_dir.clone())),
    };
    CommandRunner::new(
        collaborators,
        EngineConfig::default(),
        Arc::new(Drainer::new()),
        Arc::new(Metrics::new()),
    )
    .expect("valid engine config")
}

#[tokio::test]
async fn plan_then_apply_round_trip() {
    let data = tempfile::tempdir().unwrap();
    let h = Harness::new();
    let runner = runner(&h, exec_config(data.path()));
    let pull = fakes::pull_request();

    let outcome = runner
        .run(fakes::comment_event(CommentCommand::new(CommandName::Plan)))
        .await;
    let EventOutcome::Completed { result, .. } = outcome else {
        panic!("plan did not complete: {outcome:?}");
    };
    assert_eq!(result.project_results.len(), 2);
    assert!(result.project_results.iter().all(|r| r.is_successful()));

    let status = h.store.get(&pull.key()).await.unwrap().unwrap();
    assert_eq!(status.status_count(ProjectPlanStatus::Planned), 2);

    let outcome = runner
        .run(fakes::comment_event(
            CommentCommand::new(CommandName::Apply).with_project("net"),
        ))
        .await;
    let EventOutcome::Completed { result, .. } = outcome else {
        panic!("apply did not complete: {outcome:?}");
    };
    assert_eq!(result.project_results.len(), 1);
    assert!(result.project_results[0].is_successful());

    let checkout = paths::checkout_dir(data.path(), &pull.base_repo, pull.num);
    let net = checkout.join("default").join("net");
    assert_eq!(
        std::fs::read_to_string(net.join("applied.txt")).unwrap().trim(),
        "planned"
    );
    assert!(!net.join("net-default.tfplan").exists());

    let status = h.store.get(&pull.key()).await.unwrap().unwrap();
    assert_eq!(status.status_count(ProjectPlanStatus::Applied), 1);
    assert_eq!(status.status_count(ProjectPlanStatus::Planned), 1);
}

#[tokio::test]
async fn apply_without_plan_fails_the_project() {
    let data = tempfile::tempdir().unwrap();
    let h = Harness::new();
    let runner = runner(&h, exec_config(data.path()));

    let outcome = runner
        .run(fakes::comment_event(
            CommentCommand::new(CommandName::Apply).with_project("db"),
        ))
        .await;
    let EventOutcome::Completed { result, .. } = outcome else {
        panic!("apply did not complete: {outcome:?}");
    };
    assert!(matches!(
        result.project_results[0].outcome,
        ProjectOutcome::Failure(_)
    ));
}

#[tokio::test]
async fn policy_check_follows_plan_when_enabled() {
    let data = tempfile::tempdir().unwrap();
    let h = Harness::new();
    let mut exec = exec_config(data.path());
    exec.policy_check = true;
    let runner = runner(&h, exec);

    runner
        .run(fakes::comment_event(
            CommentCommand::new(CommandName::Plan).with_project("net"),
        ))
        .await;

    let status = h.store.get(&fakes::pull_request().key()).await.unwrap().unwrap();
    assert_eq!(status.status_count(ProjectPlanStatus::PassedPolicy), 1);
    assert!(h
        .vcs
        .comments()
        .iter()
        .any(|c| c.command == Some(CommandName::PolicyCheck)));
}

#[tokio::test]
async fn closed_pull_removes_plan_files() {
    let data = tempfile::tempdir().unwrap();
    let h = Harness::new();
    let runner = runner(&h, exec_config(data.path()));
    let pull = fakes::pull_request();

    runner
        .run(fakes::comment_event(CommentCommand::new(CommandName::Plan)))
        .await;
    let checkout = paths::checkout_dir(data.path(), &pull.base_repo, pull.num);
    assert!(checkout.join("default/net/net-default.tfplan").exists());

    assert_eq!(
        runner.run_pull_closed(&fakes::repo(), &pull).await,
        EventOutcome::Closed
    );
    assert!(!checkout.join("default/net/net-default.tfplan").exists());
    assert!(!checkout.join("default/db/db-default.tfplan").exists());
    assert!(h.store.get(&pull.key()).await.unwrap().is_none());
}

#[tokio::test]
async fn unconfigured_project_name_is_reported() {
    let data = tempfile::tempdir().unwrap();
    let h = Harness::new();
    let runner = runner(&h, exec_config(data.path()));

    let outcome = runner
        .run(fakes::comment_event(
            CommentCommand::new(CommandName::Plan).with_project("nope"),
        ))
        .await;
    let EventOutcome::Completed { result, .. } = outcome else {
        panic!("plan did not complete: {outcome:?}");
    };
    assert!(result.error.is_some());
    assert!(h.vcs.comments().iter().any(|c| c.body.contains("nope")));
}

#[test]
fn project_config_ad_hoc_defaults() {
    let p = ProjectConfig::ad_hoc(".", "default");
    assert!(!p.autoplan);
    assert!(p.name.is_none());
}
