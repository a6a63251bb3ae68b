// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level black-box tests for the quantified invariants in the
//! orchestrator's test contract ("at-most-one-charge", "terminal
//! idempotence", "resume survives a simulated process restart"). Unlike
//! the per-crate unit tests colocated with each component, these exercise
//! `oj-engine` only through its public surface (`RunRegistry`/`Collaborators`)
//! wired against the in-memory reference adapters, the same way a
//! deployment would wire it against its real collaborators.

use oj_adapters::credit_ledger::fake::InMemoryCreditLedger;
use oj_adapters::job_store::fake::InMemoryJobStore;
use oj_adapters::model_client::fake::{FakeModelClient, FakeStep};
use oj_adapters::profile_lookup::fake::FakeProfileLookup;
use oj_adapters::CreditLedger;
use oj_core::test_support::bare_job_snapshot;
use oj_core::{Clock, FakeClock, JobId, ProviderEvent, RunKind, RunState, RunStatus, StreamPayload, UserId};
use oj_engine::{BeginOptions, Collaborators, RunRegistry};
use oj_storage::RunStateStore;
use std::sync::Arc;

fn event(event_type: &str) -> ProviderEvent {
    ProviderEvent {
        event_type: event_type.to_string(),
        response_id: None,
        sequence_number: None,
        cursor: None,
        delta: None,
        snapshot: None,
        message: None,
        raw: serde_json::json!({}),
    }
}

/// A run key's worth of shared state a real deployment would put behind a
/// database and a message bus: one credit ledger, one job store, one
/// `RunStateStore`. Two `RunRegistry`s built over the same handles stand in
/// for two horizontally-scaled `ojd` processes ("Cross-process
/// coordination").
struct SharedBackend {
    credit_ledger: Arc<InMemoryCreditLedger>,
    job_store: Arc<InMemoryJobStore>,
    run_state_store: Arc<dyn RunStateStore>,
    clock: FakeClock,
}

fn shared_backend() -> SharedBackend {
    let clock = FakeClock::new();
    SharedBackend {
        credit_ledger: Arc::new(InMemoryCreditLedger::new()),
        job_store: Arc::new(InMemoryJobStore::new()),
        run_state_store: oj_storage::InMemoryRunStateStore::shared(clock.clone()),
        clock,
    }
}

fn registry_for(backend: &SharedBackend, script: Vec<FakeStep>, instance_id: &str) -> Arc<RunRegistry<FakeClock>> {
    let collaborators = Collaborators {
        credit_ledger: backend.credit_ledger.clone(),
        job_store: backend.job_store.clone(),
        model_client: Arc::new(FakeModelClient::new(script)),
        profile_lookup: Arc::new(FakeProfileLookup::new()),
        run_state_store: backend.run_state_store.clone(),
    };
    RunRegistry::new(collaborators, backend.clock.clone(), instance_id.to_string())
}

async fn drain(sub: &mut oj_engine::Subscription) -> Vec<StreamPayload> {
    let mut out = Vec::new();
    while let Some(payload) = sub.next().await {
        let terminal = payload.is_terminal();
        out.push(payload);
        if terminal {
            break;
        }
    }
    out
}

/// scenario: a run started on one instance, evicted/crashed without
/// ever reaching a terminal status (its `RunStateStore` entry is left
/// `running` with a known `responseId`), is resumed by a second instance
/// that shares only the store and completes exactly once — no second
/// charge, no lost credits.
#[tokio::test(start_paused = true)]
async fn run_resumes_across_a_simulated_process_restart() {
    let backend = shared_backend();
    let user_id = UserId::from_string("usr-restart");
    let job_id = JobId::from_string("job-restart");
    backend.credit_ledger.set_balance(&user_id, 5.0);
    backend.job_store.seed(user_id.clone(), bare_job_snapshot("job-restart"));

    // Instance A charges and captures a responseId, then "crashes" — in
    // this harness that just means its task is never driven past this
    // point; only what it already persisted into the shared store survives.
    let mut prior_state =
    RunState::new(RunKind::Research, user_id.clone(), job_id.clone(), "ojd-instance-a", backend.clock.epoch_ms());
    prior_state.response_id = Some("resp-restart".to_string());
    prior_state.meta.charged = true;
    prior_state.meta.remaining_credits = Some(5.0 - RunKind::Research.price());
    backend.run_state_store.register(prior_state).await.unwrap();
    backend.credit_ledger.deduct(&user_id, RunKind::Research.price()).await.unwrap();

    // Instance B never saw instance A's in-process executor, only the
    // store entry it left behind.
    let registry_b = registry_for(
        &backend,
        vec![FakeStep::Event(event("response.created")), FakeStep::Event(event("response.completed"))],
        "ojd-instance-b",
    );
    let opts = BeginOptions { create_if_missing: true,..Default::default() };
    let executor = registry_b.begin(user_id.clone(), RunKind::Research, Some(job_id), opts).await.unwrap();
    assert_eq!(executor.status(), RunStatus::Running, "resumed run should pick up mid-flight, not re-Start");

    let mut sub = executor.subscribe();
    let payloads = drain(&mut sub).await;
    assert!(matches!(payloads.last().unwrap(), StreamPayload::Complete {.. }));

    // At-most-one-charge: exactly one Research price was ever deducted,
    // across both the crashed instance and the resuming one.
    let balance = backend.credit_ledger.balance(&user_id).await.unwrap();
    assert_eq!(balance, 5.0 - RunKind::Research.price());
}

/// "Terminal idempotence": re-subscribing after a run has reached a
/// terminal status yields exactly one terminal payload, then end-of-stream.
#[tokio::test(start_paused = true)]
async fn resubscribing_after_terminal_yields_exactly_one_terminal_payload() {
    let backend = shared_backend();
    let user_id = UserId::from_string("usr-idempotent");
    let job_id = JobId::from_string("job-idempotent");
    backend.credit_ledger.set_balance(&user_id, 5.0);
    backend.job_store.seed(user_id.clone(), bare_job_snapshot("job-idempotent"));

    let registry = registry_for(&backend, vec![FakeStep::Event(event("response.completed"))], "ojd-solo");
    let opts = BeginOptions { create_if_missing: true,..Default::default() };
    let executor = registry.begin(user_id.clone(), RunKind::Research, Some(job_id), opts).await.unwrap();

    let mut first = executor.subscribe();
    let payloads = drain(&mut first).await;
    assert!(matches!(payloads.last().unwrap(), StreamPayload::Complete {.. }));

    let mut late = executor.subscribe();
    let replayed = drain(&mut late).await;
    assert_eq!(replayed.len(), 1, "a late subscriber should see only the terminal payload");
    assert!(matches!(replayed[0], StreamPayload::Complete {.. }));
    assert!(late.next().await.is_none(), "the buffer must end after terminal");
}

/// "At-most-one-charge": a provider failure mid-stream refunds exactly
/// the amount charged, leaving the ledger unchanged end to end.
#[tokio::test(start_paused = true)]
async fn provider_failure_leaves_the_ledger_unchanged_after_refund() {
    let backend = shared_backend();
    let user_id = UserId::from_string("usr-refund");
    let job_id = JobId::from_string("job-refund");
    backend.credit_ledger.set_balance(&user_id, 1.0);
    backend.job_store.seed(user_id.clone(), bare_job_snapshot("job-refund"));

    let registry = registry_for(
        &backend,
        vec![FakeStep::Event(event("response.created")), FakeStep::Event(event("response.failed"))],
        "ojd-solo",
    );
    let opts = BeginOptions { create_if_missing: true,..Default::default() };
    let executor = registry.begin(user_id.clone(), RunKind::Research, Some(job_id), opts).await.unwrap();
    let mut sub = executor.subscribe();
    let payloads = drain(&mut sub).await;
    assert!(matches!(payloads.last().unwrap(), StreamPayload::Error {.. }));

    assert_eq!(backend.credit_ledger.balance(&user_id).await.unwrap(), 1.0);
}
