// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use oj_core::test_support::run_state_for;
use oj_core::{FakeClock, RunKind};
use std::time::Duration;

fn store() -> (InMemoryRunStateStore<FakeClock>, FakeClock) {
    let clock = FakeClock::new();
    (InMemoryRunStateStore::new(clock.clone()), clock)
}

#[tokio::test]
async fn register_then_get_round_trips() {
    let (store, _clock) = store();
    let state = run_state_for(RunKind::Letter, "usr-1", "job-1");
    let run_key = state.run_key.clone();
    store.register(state).await.unwrap();
    let fetched = store.get(&run_key).await.unwrap();
    assert_eq!(fetched.run_key, run_key);
}

#[tokio::test]
async fn register_twice_while_running_and_fresh_fails_already_active() {
    let (store, _clock) = store();
    let state = run_state_for(RunKind::Letter, "usr-1", "job-1");
    store.register(state.clone()).await.unwrap();
    let err = store.register(state).await.unwrap_err();
    assert!(matches!(err, RunStoreError::AlreadyActive));
}

#[tokio::test]
async fn register_over_a_stale_orphan_succeeds() {
    let (store, clock) = store();
    let state = run_state_for(RunKind::Letter, "usr-1", "job-1");
    store.register(state.clone()).await.unwrap();
    clock.advance(Duration::from_secs(DEFAULT_ORPHAN_THRESHOLD_SECS + 1));
    // Stale heartbeat means this is an orphan, not a live owner.
    store.register(state).await.unwrap();
}

#[tokio::test]
async fn update_merges_and_response_id_is_immutable() {
    let (store, _clock) = store();
    let state = run_state_for(RunKind::Research, "usr-1", "job-1");
    let run_key = state.run_key.clone();
    store.register(state).await.unwrap();

    store.update(&run_key, RunStatePatch::response_id("resp-1")).await.unwrap();
    let updated = store.update(&run_key, RunStatePatch::response_id("resp-2")).await.unwrap();
    assert_eq!(updated.response_id.as_deref(), Some("resp-1"));
}

#[tokio::test]
async fn update_unknown_key_fails_not_found() {
    let (store, _clock) = store();
    let state = run_state_for(RunKind::Research, "usr-1", "job-1");
    let err = store.update(&state.run_key, RunStatePatch::default()).await.unwrap_err();
    assert!(matches!(err, RunStoreError::NotFound));
}

#[tokio::test]
async fn heartbeat_refreshes_without_clearing_charged() {
    let (store, _clock) = store();
    let state = run_state_for(RunKind::Letter, "usr-1", "job-1");
    let run_key = state.run_key.clone();
    store.register(state).await.unwrap();
    store
    .update(&run_key, RunStatePatch { charged: Some(true),..Default::default() })
    .await
    .unwrap();
    store.heartbeat(&run_key, None).await.unwrap();
    let fetched = store.get(&run_key).await.unwrap();
    assert!(fetched.meta.charged);
}

#[tokio::test]
async fn entries_expire_after_ttl() {
    let (store, clock) = store();
    let mut state = run_state_for(RunKind::Letter, "usr-1", "job-1");
    state.ttl_secs = 10;
    let run_key = state.run_key.clone();
    store.register(state).await.unwrap();
    clock.advance(Duration::from_secs(11));
    assert!(store.get(&run_key).await.is_none());
}

#[tokio::test]
async fn list_stale_finds_only_running_entries_past_threshold() {
    let (store, clock) = store();
    let running = run_state_for(RunKind::Research, "usr-1", "job-1");
    let running_key = running.run_key.clone();
    store.register(running).await.unwrap();

    let mut completed = run_state_for(RunKind::Research, "usr-2", "job-2");
    completed.status = RunStatus::Completed;
    store.register(completed).await.unwrap();

    clock.advance(Duration::from_secs(200));
    let stale = store.list_stale(120).await;
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].run_key, running_key);
}

#[tokio::test]
async fn list_all_prunes_expired_entries() {
    let (store, clock) = store();
    let mut state = run_state_for(RunKind::Letter, "usr-1", "job-1");
    state.ttl_secs = 5;
    store.register(state).await.unwrap();
    clock.advance(Duration::from_secs(6));
    assert!(store.list_all().await.is_empty());
}
