//! End-to-end command scenarios against recording fakes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use pull_state::{ProjectPlanStatus, ProjectStatus, PullStatus, PullStatusStore};
use terrabot_core::fakes::{self, BuildKind, Harness, Script, StatusCall, UnitSpec};
use terrabot_core::render;
use terrabot_core::{
    CollaboratorResult, CommandName, CommandRunner, CommentCommand, CommitState, Drainer,
    EngineConfig, EventContext, EventOutcome, Metrics, ProjectOutcome, ProjectUnit,
    ProjectUnitBuilder, Repo, RepoConfig, VcsHost,
};

fn engine(h: &Harness, config: EngineConfig) -> CommandRunner {
    CommandRunner::new(
        h.collaborators(),
        config,
        Arc::new(Drainer::new()),
        Arc::new(Metrics::new()),
    )
    .expect("valid config")
}

fn comment(name: CommandName) -> CommentCommand {
    CommentCommand::new(name)
}

fn completed(outcome: EventOutcome) -> terrabot_core::CommandResult {
    match outcome {
        EventOutcome::Completed { result, .. } => result,
        other => panic!("expected completed command, got {other:?}"),
    }
}

fn seed(h: &Harness, projects: Vec<ProjectStatus>, updated_at: chrono::DateTime<Utc>) {
    let pull = fakes::pull_request();
    h.store.insert(PullStatus::merge(
        None,
        &pull.key(),
        &pull.head_commit,
        projects,
        updated_at,
    ));
}

#[tokio::test]
async fn parallel_plan_with_one_failure_reports_failed() {
    let h = Harness::new();
    h.builder.set_units(
        BuildKind::Plan,
        vec![UnitSpec::dir("p1").parallel(), UnitSpec::dir("p2").parallel()],
    );
    h.executor.script("p2", Script::Fail("plan failed".into()));
    let runner = engine(&h, EngineConfig::default());

    let result = completed(runner.run(fakes::comment_event(comment(CommandName::Plan))).await);

    assert_eq!(result.project_results.len(), 2);
    assert_eq!(result.project_results[0].repo_rel_dir, "p1");
    assert!(result.project_results[0].is_successful());
    assert!(matches!(
        result.project_results[1].outcome,
        ProjectOutcome::Failure(_)
    ));
    assert!(result.error.is_none());

    assert!(h.status.combined_calls().contains(&StatusCall::Count {
        state: CommitState::Failed,
        command: CommandName::Plan,
        num_success: 1,
        num_total: 2,
    }));
    // Errors stop the policy check follow-on.
    assert_eq!(h.status.last_state(CommandName::PolicyCheck), None);
    assert_eq!(h.vcs.comments().len(), 1);
}

#[tokio::test]
async fn apply_all_disabled_comments_once_and_does_nothing_else() {
    let h = Harness::new();
    h.builder
        .set_units(BuildKind::Apply, vec![UnitSpec::dir("a"), UnitSpec::dir("b")]);
    let runner = engine(
        &h,
        EngineConfig {
            disable_apply_all: true,
            ..EngineConfig::default()
        },
    );

    runner
        .run(fakes::comment_event(comment(CommandName::Apply)))
        .await;

    assert!(h.executor.calls().is_empty());
    assert!(h.status.calls().is_empty());
    let comments = h.vcs.comments();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].body, render::APPLY_ALL_DISABLED_MSG);
}

#[tokio::test]
async fn apply_all_disabled_still_allows_targeted_apply() {
    let h = Harness::new();
    h.builder.set_units(BuildKind::Apply, vec![UnitSpec::dir("a")]);
    let runner = engine(
        &h,
        EngineConfig {
            disable_apply_all: true,
            ..EngineConfig::default()
        },
    );

    let result = completed(
        runner
            .run(fakes::comment_event(comment(CommandName::Apply).with_dir("a")))
            .await,
    );
    assert_eq!(result.project_results.len(), 1);
    assert_eq!(h.status.last_state(CommandName::Apply), Some(CommitState::Success));
}

#[tokio::test]
async fn stale_event_is_dropped_without_side_effects() {
    let h = Harness::new();
    h.builder.set_units(BuildKind::Plan, vec![UnitSpec::dir("a")]);
    seed(
        &h,
        vec![ProjectStatus::new("a", "default", "", ProjectPlanStatus::Planned)],
        Utc::now() + Duration::hours(1),
    );
    let runner = engine(&h, EngineConfig::default());

    let outcome = runner
        .run(fakes::comment_event(comment(CommandName::Plan)))
        .await;

    assert_eq!(outcome, EventOutcome::Stale);
    assert!(h.vcs.comments().is_empty());
    assert!(h.status.calls().is_empty());
    assert!(h.executor.calls().is_empty());
    assert_eq!(h.hooks.pre_runs(), 0);
    assert_eq!(runner.metrics().stale_commands_dropped(), 1);
}

#[tokio::test]
async fn unreadable_status_is_not_treated_as_stale() {
    let h = Harness::new();
    h.builder.set_units(BuildKind::Plan, vec![UnitSpec::dir("a")]);
    h.store.fail_reads(true);
    let runner = engine(&h, EngineConfig::default());

    let result = completed(runner.run(fakes::comment_event(comment(CommandName::Plan))).await);
    assert_eq!(result.project_results.len(), 1);
}

#[tokio::test]
async fn builder_error_fails_status_and_runs_nothing() {
    let h = Harness::new();
    h.builder.fail(BuildKind::Plan, "invalid repo config");
    let runner = engine(&h, EngineConfig::default());

    let result = completed(runner.run(fakes::comment_event(comment(CommandName::Plan))).await);

    assert!(result.project_results.is_empty());
    assert!(result
        .error
        .as_deref()
        .is_some_and(|e| e.contains("invalid repo config")));
    assert_eq!(h.status.last_state(CommandName::Plan), Some(CommitState::Failed));
    assert!(h.executor.calls().is_empty());
    assert_eq!(h.vcs.comments().len(), 1);
}

#[tokio::test]
async fn result_count_matches_unit_count_whatever_fails() {
    let h = Harness::new();
    h.builder.set_units(
        BuildKind::Plan,
        vec![
            UnitSpec::dir("ok").parallel(),
            UnitSpec::dir("fail").parallel(),
            UnitSpec::dir("error").parallel(),
            UnitSpec::dir("panic").parallel(),
        ],
    );
    h.executor.script("fail", Script::Fail("f".into()));
    h.executor.script("error", Script::Error("e".into()));
    h.executor.script("panic", Script::Panic);
    let runner = engine(&h, EngineConfig::default());

    let result = completed(runner.run(fakes::comment_event(comment(CommandName::Plan))).await);

    assert_eq!(result.project_results.len(), 4);
    assert_eq!(
        result
            .project_results
            .iter()
            .filter(|r| r.is_errored())
            .count(),
        3
    );
    assert_eq!(runner.metrics().unit_panics(), 1);
    assert_eq!(runner.metrics().units_executed(), 3);
}

#[tokio::test]
async fn parallel_plan_is_bounded_by_pool_size() {
    let h = Harness::new();
    let units = (0..6)
        .map(|i| UnitSpec::dir(&format!("p{i}")).parallel())
        .collect::<Vec<_>>();
    for i in 0..6 {
        h.executor
            .script(&format!("p{i}"), Script::Delay(std::time::Duration::from_millis(10)));
    }
    h.builder.set_units(BuildKind::Plan, units);
    let runner = engine(
        &h,
        EngineConfig {
            parallel_pool_size: 2,
            ..EngineConfig::default()
        },
    );

    let result = completed(runner.run(fakes::comment_event(comment(CommandName::Plan))).await);
    assert_eq!(result.project_results.len(), 6);
    assert!(h.executor.peak_concurrency() <= 2);
}

#[tokio::test]
async fn successful_plan_runs_policy_checks() {
    let h = Harness::new();
    h.builder.set_units(
        BuildKind::Plan,
        vec![UnitSpec::dir("a"), UnitSpec::dir("a").policy_check()],
    );
    let runner = engine(&h, EngineConfig::default());

    let outcome = runner
        .run(fakes::comment_event(comment(CommandName::Plan)))
        .await;
    let result = completed(outcome);
    assert_eq!(result.project_results.len(), 1);

    assert_eq!(
        h.executor.calls(),
        vec![
            (CommandName::Plan, "a".to_string()),
            (CommandName::PolicyCheck, "a".to_string()),
        ]
    );
    assert_eq!(
        h.status.last_state(CommandName::PolicyCheck),
        Some(CommitState::Success)
    );
    let stored = h
        .store
        .get(&fakes::pull_request().key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status_count(ProjectPlanStatus::PassedPolicy), 1);
}

#[tokio::test]
async fn plan_errors_delete_plans_when_automerge_enabled() {
    let h = Harness::new();
    h.builder
        .set_units(BuildKind::Plan, vec![UnitSpec::dir("a"), UnitSpec::dir("b")]);
    h.executor.script("b", Script::Error("init failed".into()));
    let runner = engine(
        &h,
        EngineConfig {
            automerge: true,
            ..EngineConfig::default()
        },
    );

    let result = completed(runner.run(fakes::comment_event(comment(CommandName::Plan))).await);

    assert!(result.plans_deleted);
    assert_eq!(h.cleaner.deleted(), vec![1]);
    assert!(h.vcs.comments()[0].body.contains(render::PLANS_DELETED_MSG));
}

#[tokio::test]
async fn automerge_skipped_when_a_project_is_not_applied() {
    let h = Harness::new();
    seed(
        &h,
        vec![
            ProjectStatus::new("a", "default", "", ProjectPlanStatus::Planned),
            ProjectStatus::new("b", "default", "", ProjectPlanStatus::Planned),
        ],
        Utc::now() - Duration::minutes(5),
    );
    h.builder.set_units(BuildKind::Apply, vec![UnitSpec::dir("a")]);
    let runner = engine(
        &h,
        EngineConfig {
            automerge: true,
            ..EngineConfig::default()
        },
    );

    let result = completed(
        runner
            .run(fakes::comment_event(comment(CommandName::Apply).with_dir("a")))
            .await,
    );

    assert!(!result.has_errors());
    assert!(h.vcs.merges().is_empty());
    assert_eq!(h.status.last_state(CommandName::Apply), Some(CommitState::Pending));
}

#[tokio::test]
async fn automerge_merges_once_everything_is_applied() {
    let h = Harness::new();
    seed(
        &h,
        vec![
            ProjectStatus::new("a", "default", "", ProjectPlanStatus::Applied),
            ProjectStatus::new("b", "default", "", ProjectPlanStatus::Planned),
        ],
        Utc::now() - Duration::minutes(5),
    );
    h.builder.set_units(BuildKind::Apply, vec![UnitSpec::dir("b")]);
    let runner = engine(
        &h,
        EngineConfig {
            repos: vec![RepoConfig {
                id: "acme/.*".into(),
                branch: None,
                automerge: Some(true),
                delete_source_branch_on_merge: Some(true),
            }],
            ..EngineConfig::default()
        },
    );

    runner
        .run(fakes::comment_event(comment(CommandName::Apply).with_dir("b")))
        .await;

    let merges = h.vcs.merges();
    assert_eq!(merges.len(), 1);
    assert!(merges[0].1.delete_source_branch);
    assert_eq!(runner.metrics().automerges(), 1);
    assert!(h
        .vcs
        .comments()
        .iter()
        .any(|c| c.body == render::AUTOMERGE_MSG));
}

#[tokio::test]
async fn apply_passes_mergeable_state_to_builder() {
    let h = Harness::new();
    h.builder.set_units(BuildKind::Apply, vec![UnitSpec::dir("a")]);
    let runner = engine(&h, EngineConfig::default());

    runner
        .run(fakes::comment_event(comment(CommandName::Apply)))
        .await;
    h.vcs.fail_mergeable(true);
    runner
        .run(fakes::comment_event(comment(CommandName::Apply)))
        .await;

    let seen = h.builder.seen();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].1.pull_mergeable);
    assert!(!seen[1].1.pull_mergeable);
}

#[tokio::test]
async fn approve_policies_requires_an_approver() {
    let h = Harness::new();
    h.builder
        .set_units(BuildKind::ApprovePolicies, vec![UnitSpec::dir("a")]);
    let runner = engine(
        &h,
        EngineConfig {
            policy_approvers: vec!["security-lead".into()],
            ..EngineConfig::default()
        },
    );

    let result = completed(
        runner
            .run(fakes::comment_event(comment(CommandName::ApprovePolicies)))
            .await,
    );

    assert!(result.project_results.is_empty());
    assert!(result
        .error
        .as_deref()
        .is_some_and(|e| e.contains("security-lead")));
    assert!(h.executor.calls().is_empty());
    assert!(h.status.calls().is_empty());
}

#[tokio::test]
async fn approve_policies_by_approver_updates_policy_status() {
    let h = Harness::new();
    h.builder
        .set_units(BuildKind::ApprovePolicies, vec![UnitSpec::dir("a")]);
    let runner = engine(
        &h,
        EngineConfig {
            policy_approvers: vec!["dev".into()],
            ..EngineConfig::default()
        },
    );

    let result = completed(
        runner
            .run(fakes::comment_event(comment(CommandName::ApprovePolicies)))
            .await,
    );

    assert_eq!(result.project_results.len(), 1);
    assert_eq!(
        h.status.last_state(CommandName::PolicyCheck),
        Some(CommitState::Success)
    );
}

#[tokio::test]
async fn version_touches_no_status_and_persists_nothing() {
    let h = Harness::new();
    h.builder.set_units(BuildKind::Version, vec![UnitSpec::dir("a")]);
    let runner = engine(&h, EngineConfig::default());

    let result = completed(
        runner
            .run(fakes::comment_event(comment(CommandName::Version)))
            .await,
    );

    assert_eq!(result.project_results.len(), 1);
    assert!(h.status.calls().is_empty());
    assert!(h
        .store
        .get(&fakes::pull_request().key())
        .await
        .unwrap()
        .is_none());
    assert_eq!(h.vcs.comments().len(), 1);
}

#[tokio::test]
async fn autoplan_with_no_projects_passes_every_check_silently() {
    let h = Harness::new();
    let runner = engine(&h, EngineConfig::default());

    runner.run(fakes::autoplan_event()).await;

    assert!(h.vcs.comments().is_empty());
    let calls = h.status.combined_calls();
    for command in [CommandName::Plan, CommandName::PolicyCheck, CommandName::Apply] {
        assert!(calls.contains(&StatusCall::Count {
            state: CommitState::Success,
            command,
            num_success: 0,
            num_total: 0,
        }));
    }
}

#[tokio::test]
async fn autoplan_with_no_projects_can_be_silenced() {
    let h = Harness::new();
    let runner = engine(
        &h,
        EngineConfig {
            silence_vcs_status_no_plans: true,
            ..EngineConfig::default()
        },
    );

    runner.run(fakes::autoplan_event()).await;
    assert!(h.status.calls().is_empty());
}

#[tokio::test]
async fn comment_with_no_projects_comments_unless_silenced() {
    let h = Harness::new();
    let runner = engine(&h, EngineConfig::default());
    runner
        .run(fakes::comment_event(comment(CommandName::Plan)))
        .await;
    assert_eq!(h.vcs.comments().len(), 1);

    let h = Harness::new();
    let runner = engine(
        &h,
        EngineConfig {
            silence_no_projects: true,
            ..EngineConfig::default()
        },
    );
    runner
        .run(fakes::comment_event(comment(CommandName::Plan)))
        .await;
    assert!(h.vcs.comments().is_empty());
}

#[tokio::test]
async fn silenced_comment_with_no_projects_leaves_no_status() {
    let h = Harness::new();
    let runner = engine(
        &h,
        EngineConfig {
            silence_no_projects: true,
            silence_vcs_status_no_plans: true,
            policy_approvers: vec!["dev".into()],
            ..EngineConfig::default()
        },
    );

    runner
        .run(fakes::comment_event(comment(CommandName::Plan)))
        .await;
    runner
        .run(fakes::comment_event(comment(CommandName::Apply)))
        .await;
    runner
        .run(fakes::comment_event(comment(CommandName::ApprovePolicies)))
        .await;

    assert!(h.status.calls().is_empty());
    assert_eq!(h.status.last_state(CommandName::Plan), None);
    assert_eq!(h.status.last_state(CommandName::Apply), None);
    assert!(h.vcs.comments().is_empty());
}

#[tokio::test]
async fn silenced_empty_status_still_comments() {
    let h = Harness::new();
    let runner = engine(
        &h,
        EngineConfig {
            silence_vcs_status_no_plans: true,
            ..EngineConfig::default()
        },
    );

    runner
        .run(fakes::comment_event(comment(CommandName::Plan)))
        .await;
    runner
        .run(fakes::comment_event(comment(CommandName::Apply)))
        .await;

    assert!(h.status.calls().is_empty());
    assert_eq!(h.vcs.comments().len(), 2);
}

#[tokio::test]
async fn silenced_empty_status_still_reports_real_work() {
    let h = Harness::new();
    h.builder.set_units(BuildKind::Plan, vec![UnitSpec::dir("a")]);
    let runner = engine(
        &h,
        EngineConfig {
            silence_vcs_status_no_plans: true,
            ..EngineConfig::default()
        },
    );

    runner
        .run(fakes::comment_event(comment(CommandName::Plan)))
        .await;

    let calls = h.status.combined_calls();
    assert_eq!(
        calls.first(),
        Some(&StatusCall::Combined {
            state: CommitState::Pending,
            command: CommandName::Plan,
        })
    );
    assert!(calls.contains(&StatusCall::Count {
        state: CommitState::Success,
        command: CommandName::Plan,
        num_success: 1,
        num_total: 1,
    }));
}

#[tokio::test]
async fn autoplan_disabled_ignores_pull_updates() {
    let h = Harness::new();
    h.builder.set_units(BuildKind::Autoplan, vec![UnitSpec::dir("a")]);
    let runner = engine(
        &h,
        EngineConfig {
            disable_autoplan: true,
            ..EngineConfig::default()
        },
    );

    let outcome = runner.run(fakes::autoplan_event()).await;
    assert_eq!(outcome, EventOutcome::AutoplanDisabled);
    assert!(h.executor.calls().is_empty());
}

#[tokio::test]
async fn pre_hook_failure_fails_status_and_stops() {
    let h = Harness::new();
    h.builder.set_units(BuildKind::Apply, vec![UnitSpec::dir("a")]);
    h.hooks.fail_pre(true);
    let runner = engine(&h, EngineConfig::default());

    let outcome = runner
        .run(fakes::comment_event(comment(CommandName::Apply)))
        .await;

    assert!(matches!(outcome, EventOutcome::HookFailed(_)));
    assert_eq!(h.status.last_state(CommandName::Apply), Some(CommitState::Failed));
    assert!(h.executor.calls().is_empty());
    assert!(h.hooks.post_runs().is_empty());
}

#[tokio::test]
async fn post_hook_failure_is_only_logged() {
    let h = Harness::new();
    h.builder.set_units(BuildKind::Plan, vec![UnitSpec::dir("a")]);
    h.hooks.fail_post(true);
    let runner = engine(&h, EngineConfig::default());

    let outcome = runner
        .run(fakes::comment_event(comment(CommandName::Plan)))
        .await;
    assert!(matches!(outcome, EventOutcome::Completed { .. }));
    assert_eq!(h.hooks.post_runs(), vec![CommandName::Plan]);
}

#[tokio::test]
async fn fork_pull_requests_are_rejected() {
    let h = Harness::new();
    let runner = engine(&h, EngineConfig::default());
    let mut event = fakes::comment_event(comment(CommandName::Plan));
    event.head_repo = Some(Repo::new(VcsHost::GitHub, "outsider", "infra"));

    let outcome = runner.run(event.clone()).await;
    assert!(matches!(outcome, EventOutcome::Rejected(_)));
    assert_eq!(h.vcs.comments()[0].body, render::FORK_PR_MSG);

    let h = Harness::new();
    let runner = engine(
        &h,
        EngineConfig {
            silence_fork_pr_errors: true,
            ..EngineConfig::default()
        },
    );
    runner.run(event).await;
    assert!(h.vcs.comments().is_empty());
}

#[tokio::test]
async fn closed_and_wrong_branch_pulls_are_rejected() {
    let h = Harness::new();
    let runner = engine(
        &h,
        EngineConfig {
            repos: vec![RepoConfig {
                id: "acme/infra".into(),
                branch: Some("release".into()),
                automerge: None,
                delete_source_branch_on_merge: None,
            }],
            ..EngineConfig::default()
        },
    );

    let outcome = runner
        .run(fakes::comment_event(comment(CommandName::Plan)))
        .await;
    assert!(matches!(outcome, EventOutcome::Rejected(_)));
    assert!(h.vcs.comments()[0].body.contains("`main`"));

    let h = Harness::new();
    let runner = engine(&h, EngineConfig::default());
    let mut event = fakes::comment_event(comment(CommandName::Plan));
    if let Some(pull) = event.pull.as_mut() {
        pull.state = terrabot_core::PullState::Closed;
    }
    let outcome = runner.run(event).await;
    assert!(matches!(outcome, EventOutcome::Rejected(_)));
    assert_eq!(h.vcs.comments()[0].body, render::CLOSED_PULL_MSG);
}

#[tokio::test]
async fn missing_pull_is_fetched_except_on_bitbucket() {
    let h = Harness::new();
    let runner = engine(&h, EngineConfig::default());
    let mut event = fakes::comment_event(comment(CommandName::Plan));
    event.pull = None;
    event.head_repo = None;

    let outcome = runner.run(event.clone()).await;
    assert!(matches!(outcome, EventOutcome::Completed { .. }));
    assert_eq!(h.vcs.fetches(), 1);

    event.base_repo = Repo::new(VcsHost::BitbucketCloud, "acme", "infra");
    let outcome = runner.run(event).await;
    assert!(matches!(outcome, EventOutcome::Error(ref e) if e.contains("bitbucket_cloud")));
    assert_eq!(h.vcs.fetches(), 1);
}

#[tokio::test]
async fn invalid_command_is_reported() {
    let h = Harness::new();
    let runner = engine(&h, EngineConfig::default());
    let cmd = comment(CommandName::Plan).with_project("core").with_dir("net");

    let outcome = runner.run(fakes::comment_event(cmd)).await;
    assert!(matches!(outcome, EventOutcome::Error(_)));
    assert_eq!(h.vcs.comments().len(), 1);
}

#[tokio::test]
async fn persist_failure_keeps_comment_but_skips_status() {
    let h = Harness::new();
    h.builder.set_units(BuildKind::Plan, vec![UnitSpec::dir("a")]);
    h.store.fail_writes(true);
    let runner = engine(&h, EngineConfig::default());

    runner
        .run(fakes::comment_event(comment(CommandName::Plan)))
        .await;

    assert_eq!(h.vcs.comments().len(), 1);
    assert_eq!(
        h.status.combined_calls(),
        vec![StatusCall::Combined {
            state: CommitState::Pending,
            command: CommandName::Plan,
        }]
    );
}

#[tokio::test]
async fn status_push_failures_do_not_abort() {
    let h = Harness::new();
    h.builder.set_units(BuildKind::Plan, vec![UnitSpec::dir("a")]);
    h.status.fail(true);
    h.vcs.fail_comments(true);
    let runner = engine(&h, EngineConfig::default());

    let result = completed(runner.run(fakes::comment_event(comment(CommandName::Plan))).await);
    assert_eq!(result.project_results.len(), 1);
    assert!(h
        .store
        .get(&fakes::pull_request().key())
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn per_project_statuses_are_pushed() {
    let h = Harness::new();
    h.builder
        .set_units(BuildKind::Plan, vec![UnitSpec::dir("a").named("core")]);
    let runner = engine(&h, EngineConfig::default());

    runner
        .run(fakes::comment_event(comment(CommandName::Plan)))
        .await;

    assert_eq!(
        h.status.project_calls(),
        vec![
            StatusCall::Project {
                project: "core".into(),
                command: CommandName::Plan,
                state: CommitState::Pending,
            },
            StatusCall::Project {
                project: "core".into(),
                command: CommandName::Plan,
                state: CommitState::Success,
            },
        ]
    );
}

struct PanickingBuilder;

#[async_trait]
impl ProjectUnitBuilder for PanickingBuilder {
    async fn build_autoplan_units(&self, _ctx: &EventContext) -> CollaboratorResult<Vec<ProjectUnit>> {
        panic!("builder exploded");
    }

    async fn build_plan_units(
        &self,
        _ctx: &EventContext,
        _cmd: &CommentCommand,
    ) -> CollaboratorResult<Vec<ProjectUnit>> {
        panic!("builder exploded");
    }

    async fn build_apply_units(
        &self,
        _ctx: &EventContext,
        _cmd: &CommentCommand,
    ) -> CollaboratorResult<Vec<ProjectUnit>> {
        Ok(Vec::new())
    }

    async fn build_approve_policies_units(
        &self,
        _ctx: &EventContext,
        _cmd: &CommentCommand,
    ) -> CollaboratorResult<Vec<ProjectUnit>> {
        Ok(Vec::new())
    }

    async fn build_version_units(
        &self,
        _ctx: &EventContext,
        _cmd: &CommentCommand,
    ) -> CollaboratorResult<Vec<ProjectUnit>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn event_panic_is_recovered_and_reported() {
    let h = Harness::new();
    let mut collaborators = h.collaborators();
    collaborators.builder = Arc::new(PanickingBuilder);
    let drainer = Arc::new(Drainer::new());
    let runner = CommandRunner::new(
        collaborators,
        EngineConfig::default(),
        Arc::clone(&drainer),
        Arc::new(Metrics::new()),
    )
    .unwrap();

    let outcome = runner
        .run(fakes::comment_event(comment(CommandName::Plan)))
        .await;

    assert_eq!(outcome, EventOutcome::Panicked("builder exploded".into()));
    assert_eq!(runner.metrics().event_panics(), 1);
    assert!(h.vcs.comments().iter().any(|c| c.body.contains("bug")));
    // The admission was released despite the panic.
    assert_eq!(drainer.status().in_progress_ops, 0);
}
