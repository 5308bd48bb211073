//! End-to-end tests for the orchestration facade
//!
//! All tests run on paused tokio time, so settle windows elapse instantly.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use scorch_core::{
    ChildStream, CollectionRoot, Completion, GraphStore, LedgerAction, LedgerEntry,
    MemoryGraphStore, Orchestrator, Phase, PurgeConfig, PurgeError, RunState, ScanSettings,
    StorePath, StoreResult, StoreValue,
};

// ============================================================================
// Test Utilities
// ============================================================================

fn fast_config() -> PurgeConfig {
    PurgeConfig {
        scan: ScanSettings {
            idle_window_ms: 200,
            deadline_ms: 1_000,
        },
        ..Default::default()
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("scorch_core=debug")
        .with_test_writer()
        .try_init()
        .ok();
}

fn orchestrator(store: &MemoryGraphStore) -> Arc<Orchestrator> {
    init_tracing();
    Arc::new(Orchestrator::new(Arc::new(store.clone()), fast_config()).unwrap())
}

/// Replica whose write path crashes on one location
struct CrashingStore {
    inner: MemoryGraphStore,
    crash_at: StorePath,
}

impl GraphStore for CrashingStore {
    fn subscribe_children(&self, path: &StorePath) -> StoreResult<ChildStream> {
        self.inner.subscribe_children(path)
    }

    fn write(&self, path: &StorePath, value: StoreValue) -> StoreResult<()> {
        if *path == self.crash_at {
            panic!("replica crashed writing {}", path);
        }
        self.inner.write(path, value)
    }
}

fn scenario_store() -> MemoryGraphStore {
    let store = MemoryGraphStore::new();
    store.seed_user("A");
    store.seed_user("B");
    store.seed_conversation("C1", &["A", "B"]);
    store
}

fn messages(log: &[LedgerEntry]) -> Vec<&str> {
    log.iter().map(|e| e.message.as_str()).collect()
}

fn fakes(log: &[LedgerEntry], root: CollectionRoot) -> usize {
    log.iter()
        .filter(|e| matches!(e.action, LedgerAction::FakeCreated { collection } if collection == root))
        .count()
}

fn destroyed_targets(log: &[LedgerEntry]) -> Vec<String> {
    log.iter()
        .filter(|e| matches!(e.action, LedgerAction::Destroyed { .. }))
        .map(|e| e.target_id.clone())
        .collect()
}

fn destroyed_paths(log: &[LedgerEntry], phase: Phase, id: &str) -> Vec<StorePath> {
    log.iter()
        .filter(|e| e.phase == phase && e.target_id == id)
        .find_map(|e| match &e.action {
            LedgerAction::Destroyed { paths, .. } => Some(paths.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

// ============================================================================
// Full Run
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_scenario_two_users_one_conversation() {
    let store = scenario_store();
    let orch = orchestrator(&store);

    let report = orch.emergency_destruction().await.unwrap();

    assert!(report.success);
    assert!(report.error.is_none());
    assert_eq!(report.completion, Completion::Confident);
    assert_eq!(report.phases.len(), 6);

    let log = messages(&report.log);
    assert!(log.contains(&"User destroyed: A"));
    assert!(log.contains(&"User destroyed: B"));
    assert!(log.contains(&"Conversation destroyed: C1"));
    assert_eq!(fakes(&report.log, CollectionRoot::Users), 5);
    assert_eq!(fakes(&report.log, CollectionRoot::Conversations), 3);

    let status = orch.get_status();
    assert!(!status.running);
    assert_eq!(status.state, RunState::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_every_denormalized_location_is_tombstoned() {
    let store = scenario_store();
    let orch = orchestrator(&store);

    let report = orch.emergency_destruction().await.unwrap();

    for id in ["A", "B"] {
        let expected = vec![
            CollectionRoot::Users.child(id),
            StorePath::personal(id),
            CollectionRoot::Profiles.child(id),
        ];
        for path in &expected {
            assert_eq!(store.get(path), Some(StoreValue::Tombstone), "{} survived", path);
        }
        // The ledger names every location that was written
        assert_eq!(destroyed_paths(&report.log, Phase::Users, id), expected);
    }
    assert_eq!(
        destroyed_paths(&report.log, Phase::Conversations, "C1"),
        vec![
            CollectionRoot::Conversations.child("C1"),
            CollectionRoot::Messages.child("C1"),
        ]
    );
    assert_eq!(
        store.get(&CollectionRoot::Conversations.child("C1")),
        Some(StoreValue::Tombstone)
    );
    assert_eq!(
        store.get(&CollectionRoot::Messages.child("C1")),
        Some(StoreValue::Tombstone)
    );
}

#[tokio::test(start_paused = true)]
async fn test_phases_run_in_order_and_issue_one_set_per_id() {
    let store = scenario_store();
    store.seed(
        &CollectionRoot::Friendships.child("A_B"),
        serde_json::json!({ "a": "A", "b": "B" }),
    );
    store.seed(
        &CollectionRoot::Messages.child("orphan"),
        serde_json::json!({ "text": "hi" }),
    );
    let orch = orchestrator(&store);

    let report = orch.emergency_destruction().await.unwrap();

    let order: Vec<Phase> = report.phases.iter().map(|p| p.phase).collect();
    assert_eq!(order, Phase::ORDERED.to_vec());

    for phase in &report.phases[..4] {
        assert_eq!(phase.enumerated, phase.tombstoned + phase.skipped, "{:?}", phase.phase);
        assert!(phase.is_confident());
        assert!(phase.completed_at >= phase.started_at);
    }
    assert_eq!(report.phases[0].tombstoned, 2);
    assert_eq!(report.phases[0].paths_issued, 6);
    assert_eq!(report.phases[1].tombstoned, 1);
    // messages/C1 went with its conversation; only the orphan is left
    assert_eq!(report.phases[2].tombstoned, 1);
    assert_eq!(report.phases[3].tombstoned, 1);
    assert_eq!(report.phases[5].records_created, 8);

    let log = messages(&report.log);
    assert!(log.contains(&"Message destroyed: orphan"));
    assert!(log.contains(&"Friendship destroyed: A_B"));
    assert!(!log.contains(&"Message destroyed: C1"));
}

#[tokio::test(start_paused = true)]
async fn test_fake_records_are_stamped_after_tombstone_phase() {
    let store = scenario_store();
    let orch = orchestrator(&store);

    let report = orch.emergency_destruction().await.unwrap();
    let users_done = report.phases[0].completed_at;
    let conversations_done = report.phases[1].completed_at;

    let mut seen = 0;
    for (path, value) in store.issued_writes() {
        let Some(node) = value.as_node() else { continue };
        assert_eq!(node["fake"], true);
        assert_eq!(node["overwritten"], true);
        let created: DateTime<Utc> = node["createdAt"].as_str().unwrap().parse().unwrap();
        if path.as_str().starts_with("conversations/") {
            assert!(created > conversations_done);
        } else {
            assert!(created > users_done);
        }
        seen += 1;
    }
    // 5 users mirrored to their personal roots + 3 conversations
    assert_eq!(seen, 13);
}

#[tokio::test(start_paused = true)]
async fn test_back_to_back_runs_are_idempotent() {
    let store = scenario_store();
    let orch = orchestrator(&store);

    let first = orch.emergency_destruction().await.unwrap();
    let second = orch.emergency_destruction().await.unwrap();

    assert!(first.success);
    assert!(second.success);
    // Only the previous run's synthetic records are still observed
    for target in destroyed_targets(&second.log) {
        assert!(target.starts_with("fake_"), "unexpected target {}", target);
    }
    assert!(!messages(&second.log).contains(&"User destroyed: A"));
    assert_eq!(orch.run_state(), RunState::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_empty_store_run_succeeds() {
    let store = MemoryGraphStore::new();
    let orch = orchestrator(&store);

    let report = orch.emergency_destruction().await.unwrap();

    assert!(report.success);
    assert!(destroyed_targets(&report.log).is_empty());
    assert_eq!(report.phases[5].records_created, 8);
}

// ============================================================================
// Guard and Status
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_second_run_rejected_while_running() {
    let store = scenario_store();
    let orch = orchestrator(&store);

    let first = tokio::spawn({
        let orch = orch.clone();
        async move { orch.emergency_destruction().await }
    });
    // First run is now waiting for its users scan to settle
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(orch.run_state(), RunState::Running);

    let entries_before = orch.ledger().len();
    let writes_before = store.write_count();

    let err = orch.emergency_destruction().await.unwrap_err();

    assert_eq!(err, PurgeError::AlreadyRunning);
    assert_eq!(orch.ledger().len(), entries_before);
    assert_eq!(store.write_count(), writes_before);

    let report = first.await.unwrap().unwrap();
    assert!(report.success);
    assert!(!orch.get_status().running);
}

#[tokio::test(start_paused = true)]
async fn test_status_during_run_is_partial_and_non_blocking() {
    let store = scenario_store();
    let orch = orchestrator(&store);

    let run = tokio::spawn({
        let orch = orch.clone();
        async move { orch.emergency_destruction().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let status = orch.get_status();
    assert!(status.running);
    assert_eq!(status.state, RunState::Running);
    assert!(!status.log.is_empty());
    assert_eq!(orch.run_state(), RunState::Running);

    let report = run.await.unwrap().unwrap();
    assert!(report.log.len() > status.log.len());
}

#[tokio::test(start_paused = true)]
async fn test_clear_log_mid_run_only_affects_visibility() {
    let store = scenario_store();
    let orch = orchestrator(&store);

    let run = tokio::spawn({
        let orch = orch.clone();
        async move { orch.emergency_destruction().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    orch.clear_log();

    let report = run.await.unwrap().unwrap();
    assert!(report.success);
    assert!(messages(&report.log).contains(&"User destroyed: A"));
    assert!(orch.ledger().len() < report.log.len());

    orch.clear_log();
    assert!(orch.get_status().log.is_empty());
}

// ============================================================================
// Failure Paths
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_phase_failure_aborts_remaining_phases() {
    let store = scenario_store();
    store.set_unavailable(&CollectionRoot::Friendships.path());
    let orch = orchestrator(&store);

    let report = orch.emergency_destruction().await.unwrap();

    assert!(!report.success);
    let error = report.error.clone().unwrap();
    assert!(error.contains("Friendships"), "{}", error);
    assert_eq!(report.phases.len(), 3);
    assert_eq!(fakes(&report.log, CollectionRoot::Users), 0);
    assert!(matches!(
        report.log.last().unwrap().action,
        LedgerAction::PhaseFailed { .. }
    ));

    // Issued tombstones stay in effect
    assert_eq!(
        store.get(&CollectionRoot::Users.child("A")),
        Some(StoreValue::Tombstone)
    );
    // Guard released
    assert_eq!(orch.run_state(), RunState::Failed);
    assert!(orch.emergency_destruction().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_worker_panic_still_records_completed_write_sets() {
    init_tracing();
    let store = MemoryGraphStore::new();
    for id in ["a", "b", "c", "d"] {
        store.seed_user(id);
    }
    let crashing = CrashingStore {
        inner: store.clone(),
        crash_at: CollectionRoot::Users.child("b"),
    };
    let config = PurgeConfig {
        write_concurrency: 1,
        ..fast_config()
    };
    let orch = Orchestrator::new(Arc::new(crashing), config).unwrap();

    let report = orch.emergency_destruction().await.unwrap();

    assert!(!report.success);
    let error = report.error.clone().unwrap();
    assert!(error.contains("Tombstone worker failed"), "{}", error);
    assert!(report.phases.is_empty());

    // Write sets issued after the crash reach the ledger too
    assert_eq!(destroyed_targets(&report.log), vec!["a", "c", "d"]);
    for id in ["c", "d"] {
        assert_eq!(
            store.get(&CollectionRoot::Users.child(id)),
            Some(StoreValue::Tombstone)
        );
    }
    assert!(matches!(
        report.log.last().unwrap().action,
        LedgerAction::PhaseFailed { .. }
    ));
    assert_eq!(orch.run_state(), RunState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_per_entity_write_failure_does_not_abort() {
    let store = scenario_store();
    store.reject_writes_under("~");
    let orch = orchestrator(&store);

    let report = orch.emergency_destruction().await.unwrap();

    assert!(report.success);
    let users = &report.phases[0];
    assert_eq!(users.tombstoned, 2);
    assert_eq!(users.paths_failed, 2);
    assert_eq!(users.paths_issued, 4);

    let failed: Vec<_> = report
        .log
        .iter()
        .filter(|e| e.phase == Phase::Users && matches!(e.action, LedgerAction::WriteFailed { .. }))
        .map(|e| e.target_id.as_str())
        .collect();
    assert_eq!(failed, vec!["A", "B"]);
    assert!(messages(&report.log).contains(&"User destroyed: A"));
    assert_eq!(
        store.get(&CollectionRoot::Profiles.child("A")),
        Some(StoreValue::Tombstone)
    );
    // Fake users still land in the collection even though their mirrors fail
    assert_eq!(fakes(&report.log, CollectionRoot::Users), 5);
}

#[tokio::test(start_paused = true)]
async fn test_internal_clear_failure_is_not_fatal() {
    let store = scenario_store();
    store.fail_internal_clear("journal locked");
    let orch = orchestrator(&store);

    let report = orch.emergency_destruction().await.unwrap();

    assert!(report.success);
    assert!(report
        .log
        .iter()
        .any(|e| matches!(e.action, LedgerAction::StoreClearFailed { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_internal_clear_runs_hooks() {
    let store = scenario_store();
    let orch = orchestrator(&store);

    let report = orch.emergency_destruction().await.unwrap();

    assert!(messages(&report.log).contains(&"Internal store cleared: journal"));
    // Only the overwrite phase wrote after the clear
    assert_eq!(store.journal_len(), 13);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_between_phases() {
    let store = scenario_store();
    let orch = orchestrator(&store);
    assert!(!orch.cancel());

    let run = tokio::spawn({
        let orch = orch.clone();
        async move { orch.emergency_destruction().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(orch.cancel());

    let report = run.await.unwrap().unwrap();

    assert!(!report.success);
    assert_eq!(
        report.error.as_deref(),
        Some("Run cancelled before phase Conversations")
    );
    // The in-flight Users phase finished; nothing after it ran
    assert_eq!(report.phases.len(), 1);
    assert_eq!(
        store.get(&CollectionRoot::Users.child("A")),
        Some(StoreValue::Tombstone)
    );
    assert!(store.get(&CollectionRoot::Conversations.child("C1")).unwrap().as_node().is_some());
    assert_eq!(orch.run_state(), RunState::Failed);
    assert!(!orch.cancel());
}

#[tokio::test(start_paused = true)]
async fn test_dropped_run_clears_cancellation() {
    let store = scenario_store();
    let orch = orchestrator(&store);

    // The users scan is still settling when the host gives up on the run
    let dropped = tokio::time::timeout(Duration::from_millis(50), orch.emergency_destruction()).await;
    assert!(dropped.is_err());

    assert!(!orch.cancel());
    assert_eq!(orch.run_state(), RunState::Failed);
    assert!(orch.emergency_destruction().await.unwrap().success);
}

#[tokio::test(start_paused = true)]
async fn test_equal_idle_and_deadline_settles_confidently() {
    init_tracing();
    let store = scenario_store();
    let config = PurgeConfig {
        scan: ScanSettings {
            idle_window_ms: 500,
            deadline_ms: 500,
        },
        ..Default::default()
    };
    let orch = Orchestrator::new(Arc::new(store), config).unwrap();

    let report = orch.emergency_destruction().await.unwrap();

    assert!(report.success);
    assert_eq!(report.completion, Completion::Confident);
    assert!(report.phases.iter().all(|p| p.is_confident()));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_forced_completion_is_reported() {
    let store = MemoryGraphStore::new();
    store.seed_user("A");
    let orch = orchestrator(&store);

    let trickle = tokio::spawn({
        let store = store.clone();
        async move {
            for i in 0..30 {
                tokio::time::sleep(Duration::from_millis(100)).await;
                store.seed_user(&format!("late{}", i));
            }
        }
    });

    let report = orch.emergency_destruction().await.unwrap();
    trickle.await.unwrap();

    assert!(report.success);
    assert_eq!(report.completion, Completion::DeadlineForced);
    assert!(!report.phases[0].is_confident());
    assert!(report.phases[1].is_confident());
}

#[tokio::test(start_paused = true)]
async fn test_later_merging_write_resurrects_and_is_purged_again() {
    let store = scenario_store();
    let orch = orchestrator(&store);
    orch.emergency_destruction().await.unwrap();

    let path = CollectionRoot::Users.child("A");
    let stale = StoreValue::node(serde_json::json!({ "id": "A" }));
    assert!(store.merge_remote(&path, stale, store.clock_of(&path) + 1));
    assert!(store
        .live_children(&CollectionRoot::Users.path())
        .contains(&"A".to_string()));

    let report = orch.emergency_destruction().await.unwrap();
    assert!(messages(&report.log).contains(&"User destroyed: A"));
    assert_eq!(store.get(&path), Some(StoreValue::Tombstone));
}

// ============================================================================
// Quick Reset
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_quick_reset_tombstones_only_roots() {
    let store = scenario_store();
    let orch = orchestrator(&store);

    let report = orch.quick_reset();

    assert!(report.success);
    assert!(!report.recursive);
    assert_eq!(report.tombstoned.len(), 5);
    assert_eq!(store.write_count(), 5);
    for (path, value) in store.issued_writes() {
        assert!(value.is_tombstone());
        assert!(!path.as_str().contains('/'));
    }
    // Children were not enumerated
    assert_eq!(
        store.live_children(&CollectionRoot::Users.path()),
        vec!["A".to_string(), "B".to_string()]
    );
    assert_eq!(orch.run_state(), RunState::Idle);
    assert_eq!(orch.get_status().log.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_quick_reset_ignores_run_guard() {
    let store = scenario_store();
    let orch = orchestrator(&store);

    let run = tokio::spawn({
        let orch = orch.clone();
        async move { orch.emergency_destruction().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let reset = orch.quick_reset();
    assert!(reset.success);
    assert!(run.await.unwrap().unwrap().success);
}

#[tokio::test(start_paused = true)]
async fn test_quick_reset_reports_failed_roots() {
    let store = MemoryGraphStore::new();
    store.reject_writes_under("profiles");
    let orch = orchestrator(&store);

    let report = orch.quick_reset();

    assert!(!report.success);
    assert_eq!(report.tombstoned.len(), 4);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, CollectionRoot::Profiles.path());
}

// ============================================================================
// Wire Shape
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_responses_serialize_with_camel_case_keys() {
    let store = scenario_store();
    let orch = orchestrator(&store);

    let report = orch.emergency_destruction().await.unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["success"], true);
    assert!(json["durationMs"].is_u64());
    assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    assert!(json["log"].is_array());
    assert!(json.get("error").is_none());

    let status = serde_json::to_value(orch.get_status()).unwrap();
    assert_eq!(status["running"], false);
    assert!(status["log"][0]["targetId"].is_string());

    let rejected = scorch_core::ErrorResponse::from(&PurgeError::AlreadyRunning);
    let json = serde_json::to_value(&rejected).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "A destruction run is already in progress");
}
