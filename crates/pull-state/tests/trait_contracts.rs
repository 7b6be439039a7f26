//! Trait contract tests for PullStatusStore.
//!
//! Every backend runs the same behavioural checks; any conforming
//! implementation must pass these.

use pull_state::fakes::MemoryPullStatusStore;
use pull_state::{ProjectPlanStatus, ProjectStatus, PullKey, PullStatusStore, SurrealPullStatusStore};

fn pull(num: u64) -> PullKey {
    PullKey::new("github", "acme/infra", num)
}

fn planned(dir: &str) -> ProjectStatus {
    ProjectStatus::new(dir, "default", "", ProjectPlanStatus::Planned)
}

async fn check_get_missing_is_none(store: &dyn PullStatusStore) {
    assert!(store.get(&pull(1)).await.unwrap().is_none());
}

async fn check_update_then_get(store: &dyn PullStatusStore) {
    let written = store
        .update(&pull(2), "abc", vec![planned("net"), planned("db")])
        .await
        .unwrap();
    assert_eq!(written.projects.len(), 2);

    let read = store.get(&pull(2)).await.unwrap().expect("status stored");
    assert_eq!(read, written);
}

async fn check_update_merges_by_project(store: &dyn PullStatusStore) {
    store
        .update(&pull(3), "abc", vec![planned("net"), planned("db")])
        .await
        .unwrap();
    let merged = store
        .update(
            &pull(3),
            "abc",
            vec![ProjectStatus::new(
                "net",
                "default",
                "",
                ProjectPlanStatus::Applied,
            )],
        )
        .await
        .unwrap();

    assert_eq!(merged.projects.len(), 2);
    assert_eq!(merged.status_count(ProjectPlanStatus::Applied), 1);
    assert_eq!(merged.status_count(ProjectPlanStatus::Planned), 1);
}

async fn check_updated_at_advances(store: &dyn PullStatusStore) {
    let first = store.update(&pull(4), "abc", vec![planned("a")]).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = store.update(&pull(4), "abc", vec![planned("a")]).await.unwrap();
    assert!(second.updated_at > first.updated_at);
}

async fn check_delete_removes(store: &dyn PullStatusStore) {
    store.update(&pull(5), "abc", vec![planned("a")]).await.unwrap();
    let removed = store.delete(&pull(5)).await.unwrap();
    assert!(removed.is_some());
    assert!(store.get(&pull(5)).await.unwrap().is_none());
    assert!(store.delete(&pull(5)).await.unwrap().is_none());
}

async fn check_pulls_are_isolated(store: &dyn PullStatusStore) {
    store.update(&pull(6), "abc", vec![planned("a")]).await.unwrap();
    store.update(&pull(7), "abc", vec![planned("b")]).await.unwrap();

    let six = store.get(&pull(6)).await.unwrap().unwrap();
    assert_eq!(six.projects.len(), 1);
    assert_eq!(six.projects[0].repo_rel_dir, "a");
}

async fn run_contract(store: &dyn PullStatusStore) {
    check_get_missing_is_none(store).await;
    check_update_then_get(store).await;
    check_update_merges_by_project(store).await;
    check_updated_at_advances(store).await;
    check_delete_removes(store).await;
    check_pulls_are_isolated(store).await;
}

#[tokio::test]
async fn memory_store_satisfies_contract() {
    let store = MemoryPullStatusStore::new();
    run_contract(&store).await;
}

#[tokio::test]
async fn surreal_store_satisfies_contract() {
    let store = SurrealPullStatusStore::in_memory()
        .await
        .expect("in_memory() failed");
    run_contract(&store).await;
}

#[tokio::test]
async fn memory_store_injected_failures() {
    let store = MemoryPullStatusStore::new();
    store.fail_reads(true);
    assert!(store.get(&pull(1)).await.is_err());

    store.fail_writes(true);
    assert!(store.update(&pull(1), "abc", vec![]).await.is_err());
}
