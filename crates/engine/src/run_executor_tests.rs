// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use oj_adapters::credit_ledger::fake::InMemoryCreditLedger;
use oj_adapters::job_store::fake::InMemoryJobStore;
use oj_adapters::model_client::fake::{FakeModelClient, FakeStep};
use oj_adapters::model_client::ProviderResponseState;
use oj_adapters::profile_lookup::fake::FakeProfileLookup;
use oj_adapters::RecipientProfile;
use oj_core::test_support::{bare_job_snapshot, research_ready_job_snapshot};
use oj_core::{FakeClock, JobId, ProviderEvent, UserId};
use oj_storage::InMemoryRunStateStore;
use std::time::Duration;

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

fn profile() -> RecipientProfile {
    RecipientProfile::builder().build()
}

fn complete_letter_json() -> String {
    serde_json::json!({
            "mp_name": "x", "mp_address_1": "x", "mp_address_2": "x", "mp_city": "x",
            "mp_county": "x", "mp_postcode": "x", "date": "x",
            "subject_line_html": "Re: the bypass",
            "letter_content": "Dear Sir, I write regarding the bypass.",
            "sender_name": "x", "sender_address_1": "x", "sender_address_2": "x",
            "sender_address_3": "x", "sender_city": "x", "sender_county": "x",
            "sender_postcode": "x", "sender_phone": "x",
            "references": ["https://example.com/a"]
    })
    .to_string()
}

struct Harness {
    registry: Arc<RunRegistry<FakeClock>>,
    credit_ledger: Arc<InMemoryCreditLedger>,
    job_store: Arc<InMemoryJobStore>,
    model_client: Arc<FakeModelClient>,
    profile_lookup: Arc<FakeProfileLookup>,
    run_state_store: Arc<InMemoryRunStateStore<FakeClock>>,
    clock: FakeClock,
}

fn harness(script: Vec<FakeStep>) -> Harness {
    let clock = FakeClock::new();
    let credit_ledger = Arc::new(InMemoryCreditLedger::new());
    let job_store = Arc::new(InMemoryJobStore::new());
    let model_client = Arc::new(FakeModelClient::new(script));
    let profile_lookup = Arc::new(FakeProfileLookup::new());
    let run_state_store = InMemoryRunStateStore::shared(clock.clone());

    let collaborators = Collaborators {
        credit_ledger: credit_ledger.clone(),
        job_store: job_store.clone(),
        model_client: model_client.clone(),
        profile_lookup: profile_lookup.clone(),
        run_state_store: run_state_store.clone(),
    };
    let registry = RunRegistry::new(collaborators, clock.clone(), "test-instance");

    Harness { registry, credit_ledger, job_store, model_client, profile_lookup, run_state_store, clock }
}

async fn drain(sub: &mut Subscription) -> Vec<StreamPayload> {
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

#[tokio::test(start_paused = true)]
async fn happy_path_letter_run_charges_streams_and_persists() {
    let user_id = UserId::from_string("usr-1");
    let job_id = JobId::from_string("job-1");
    let h = harness(vec![
            FakeStep::Event(event("response.created")),
            FakeStep::Event(ProviderEvent { delta: Some(complete_letter_json()),..event("response.output_text.delta") }),
            FakeStep::Event(event("response.completed")),
    ]);
    h.credit_ledger.set_balance(&user_id, 10.0);
    h.job_store.seed(user_id.clone(), research_ready_job_snapshot("job-1"));
    h.profile_lookup.set(user_id.clone(), profile());

    let opts = BeginOptions { create_if_missing: true, tone: Some(LetterTone::Formal),..Default::default() };
    let executor = h.registry.begin(user_id.clone(), RunKind::Letter, Some(job_id), opts).await.unwrap();
    let mut sub = executor.subscribe();

    let payloads = drain(&mut sub).await;
    let last = payloads.last().unwrap();
    assert!(matches!(last, StreamPayload::Complete {.. }), "expected Complete, got {last:?}");

    let balance = h.credit_ledger.balance(&user_id).await.unwrap();
    assert_eq!(balance, 10.0 - RunKind::Letter.price());

    let snapshot = h.job_store.get(&user_id).await.unwrap().unwrap();
    assert_eq!(snapshot.letter_status, Some(JobStatus::Completed));
    assert!(snapshot.letter_content.unwrap().contains("A. Member"));
}

#[tokio::test(start_paused = true)]
async fn insufficient_credits_fails_before_streaming_and_does_not_call_provider() {
    let user_id = UserId::from_string("usr-2");
    let job_id = JobId::from_string("job-2");
    let h = harness(vec![FakeStep::Event(event("response.completed"))]);
    h.credit_ledger.set_balance(&user_id, 0.0);
    h.job_store.seed(user_id.clone(), research_ready_job_snapshot("job-2"));
    h.profile_lookup.set(user_id.clone(), profile());

    let opts = BeginOptions { create_if_missing: true, tone: Some(LetterTone::Formal),..Default::default() };
    let executor = h.registry.begin(user_id.clone(), RunKind::Letter, Some(job_id), opts).await.unwrap();
    let mut sub = executor.subscribe();

    let payloads = drain(&mut sub).await;
    let last = payloads.last().unwrap();
    assert!(matches!(last, StreamPayload::Error { message,.. } if message == "You don't have enough credits for this."));
    assert_eq!(h.model_client.create_stream_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn provider_terminal_failure_refunds_the_charge() {
    let user_id = UserId::from_string("usr-3");
    let job_id = JobId::from_string("job-3");
    let h = harness(vec![
            FakeStep::Event(event("response.created")),
            FakeStep::Event(event("response.failed")),
    ]);
    h.credit_ledger.set_balance(&user_id, 5.0);
    h.job_store.seed(user_id.clone(), bare_job_snapshot("job-3"));

    let opts = BeginOptions { create_if_missing: true,..Default::default() };
    let executor = h.registry.begin(user_id.clone(), RunKind::Research, Some(job_id), opts).await.unwrap();
    let mut sub = executor.subscribe();

    let payloads = drain(&mut sub).await;
    assert!(matches!(payloads.last().unwrap(), StreamPayload::Error {.. }));

    let balance = h.credit_ledger.balance(&user_id).await.unwrap();
    assert_eq!(balance, 5.0, "charge should have been refunded on provider failure");

    let snapshot = h.job_store.get(&user_id).await.unwrap().unwrap();
    assert_eq!(snapshot.research_status, Some(JobStatus::Error));
}

#[tokio::test(start_paused = true)]
async fn malformed_letter_document_fails_the_run_and_refunds() {
    let user_id = UserId::from_string("usr-3b");
    let job_id = JobId::from_string("job-3b");
    let h = harness(vec![
            FakeStep::Event(event("response.created")),
            FakeStep::Event(ProviderEvent { delta: Some("not json".into()),..event("response.output_text.delta") }),
            FakeStep::Event(event("response.completed")),
    ]);
    h.credit_ledger.set_balance(&user_id, 5.0);
    h.job_store.seed(user_id.clone(), research_ready_job_snapshot("job-3b"));
    h.profile_lookup.set(user_id.clone(), profile());

    let opts = BeginOptions { create_if_missing: true, tone: Some(LetterTone::Formal),..Default::default() };
    let executor = h.registry.begin(user_id.clone(), RunKind::Letter, Some(job_id), opts).await.unwrap();
    let mut sub = executor.subscribe();

    let payloads = drain(&mut sub).await;
    assert_eq!(payloads.iter().filter(|p| matches!(p, StreamPayload::Error {.. })).count(), 1);
    assert!(matches!(payloads.last().unwrap(), StreamPayload::Error {.. }), "expected a single terminal error, got {payloads:?}");

    let balance = h.credit_ledger.balance(&user_id).await.unwrap();
    assert_eq!(balance, 5.0, "charge should have been refunded when the final buffer fails to parse");

    let snapshot = h.job_store.get(&user_id).await.unwrap().unwrap();
    assert_eq!(snapshot.letter_status, Some(JobStatus::Error));
}

#[tokio::test(start_paused = true)]
async fn transport_blip_resumes_and_still_completes() {
    let user_id = UserId::from_string("usr-4");
    let job_id = JobId::from_string("job-4");
    let h = harness(vec![
            FakeStep::Event(ProviderEvent { response_id: Some("resp-4".into()),..event("response.created") }),
            FakeStep::Fail("socket hang up".into()),
            FakeStep::Event(ProviderEvent { snapshot: Some("partial dossier".into()),..event("response.output_text.delta") }),
            FakeStep::Event(event("response.completed")),
    ]);
    h.credit_ledger.set_balance(&user_id, 5.0);
    h.job_store.seed(user_id.clone(), bare_job_snapshot("job-4"));

    let opts = BeginOptions { create_if_missing: true,..Default::default() };
    let executor = h.registry.begin(user_id.clone(), RunKind::Research, Some(job_id), opts).await.unwrap();
    let mut sub = executor.subscribe();

    let payloads = drain(&mut sub).await;
    assert!(matches!(payloads.last().unwrap(), StreamPayload::Complete {.. }));
    assert!(h.model_client.resume_stream_calls() >= 1);

    let snapshot = h.job_store.get(&user_id).await.unwrap().unwrap();
    assert_eq!(snapshot.research_status, Some(JobStatus::Completed));
    assert_eq!(snapshot.research_content.as_deref(), Some("partial dossier"));
}

#[tokio::test(start_paused = true)]
async fn missing_response_starts_a_fresh_stream() {
    let user_id = UserId::from_string("usr-5");
    let job_id = JobId::from_string("job-5");
    let h = harness(vec![
            FakeStep::Event(ProviderEvent { response_id: Some("resp-5".into()),..event("response.created") }),
            FakeStep::Fail("response resp_5 not found".into()),
            FakeStep::Event(event("response.completed")),
    ]);
    h.credit_ledger.set_balance(&user_id, 5.0);
    h.job_store.seed(user_id.clone(), bare_job_snapshot("job-5"));

    let opts = BeginOptions { create_if_missing: true,..Default::default() };
    let executor = h.registry.begin(user_id.clone(), RunKind::Research, Some(job_id), opts).await.unwrap();
    let mut sub = executor.subscribe();

    let payloads = drain(&mut sub).await;
    assert!(matches!(payloads.last().unwrap(), StreamPayload::Complete {.. }));
    assert!(h.model_client.create_stream_calls() >= 2, "a fresh stream should have been requested");
}

#[tokio::test(start_paused = true)]
async fn resume_exhaustion_falls_back_to_background_polling() {
    let user_id = UserId::from_string("usr-6");
    let job_id = JobId::from_string("job-6");
    let mut script = vec![FakeStep::Event(ProviderEvent {
                response_id: Some("resp-6".into()),
                ..event("response.created")
    })];
    for _ in 0..(MAX_ATTEMPTS_FOR_TEST + 1) {
        script.push(FakeStep::Fail("connection reset".into()));
    }
    let h = harness(script);
    h.credit_ledger.set_balance(&user_id, 5.0);
    h.job_store.seed(user_id.clone(), bare_job_snapshot("job-6"));
    h.model_client.set_retrieve_result(oj_adapters::ProviderResponse {
            state: ProviderResponseState::Completed,
            content: Some("polled dossier".into()),
    });

    let opts = BeginOptions { create_if_missing: true,..Default::default() };
    let executor = h.registry.begin(user_id.clone(), RunKind::Research, Some(job_id), opts).await.unwrap();
    let mut sub = executor.subscribe();

    let payloads = drain(&mut sub).await;
    assert!(matches!(payloads.last().unwrap(), StreamPayload::Complete {.. }));

    let snapshot = h.job_store.get(&user_id).await.unwrap().unwrap();
    assert_eq!(snapshot.research_content.as_deref(), Some("polled dossier"));
}

#[tokio::test(start_paused = true)]
async fn begin_is_idempotent_while_a_run_is_already_live() {
    let user_id = UserId::from_string("usr-7");
    let job_id = JobId::from_string("job-7");
    let h = harness(vec![FakeStep::Event(event("response.created"))]);
    h.credit_ledger.set_balance(&user_id, 5.0);
    h.job_store.seed(user_id.clone(), bare_job_snapshot("job-7"));

    let opts = BeginOptions { create_if_missing: true,..Default::default() };
    let first = h.registry.begin(user_id.clone(), RunKind::Research, Some(job_id.clone()), opts.clone()).await.unwrap();
    let second = h.registry.begin(user_id.clone(), RunKind::Research, Some(job_id), opts).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second), "a second Begin without restart should return the same executor");
}

#[tokio::test(start_paused = true)]
async fn letter_precondition_fails_without_completed_research() {
    let user_id = UserId::from_string("usr-8");
    let job_id = JobId::from_string("job-8");
    let h = harness(vec![]);
    h.job_store.seed(user_id.clone(), bare_job_snapshot("job-8"));

    let opts = BeginOptions { create_if_missing: true, tone: Some(LetterTone::Formal),..Default::default() };
    let result = h.registry.begin(user_id.clone(), RunKind::Letter, Some(job_id), opts).await;
    assert!(matches!(result, Err(OrchestratorError::PreconditionNotMet(_))));
}

#[tokio::test(start_paused = true)]
async fn no_run_to_resume_when_nothing_is_active_and_create_if_missing_is_false() {
    let user_id = UserId::from_string("usr-9");
    let job_id = JobId::from_string("job-9");
    let h = harness(vec![]);
    h.job_store.seed(user_id.clone(), bare_job_snapshot("job-9"));

    let opts = BeginOptions { create_if_missing: false,..Default::default() };
    let result = h.registry.begin(user_id.clone(), RunKind::Research, Some(job_id), opts).await;
    assert!(matches!(result, Err(OrchestratorError::NoRunToResume)));
}

const MAX_ATTEMPTS_FOR_TEST: u32 = crate::resume_policy::MAX_ATTEMPTS;

#[tokio::test(start_paused = true)]
async fn operator_cancel_refunds_a_charged_running_run() {
    let user_id = UserId::from_string("usr-10");
    let job_id = JobId::from_string("job-10");
    let h = harness(vec![
            FakeStep::Event(event("response.created")),
            FakeStep::Pending,
    ]);
    h.credit_ledger.set_balance(&user_id, 5.0);
    h.job_store.seed(user_id.clone(), bare_job_snapshot("job-10"));

    let opts = BeginOptions { create_if_missing: true,..Default::default() };
    let executor = h.registry.begin(user_id.clone(), RunKind::Research, Some(job_id), opts).await.unwrap();
    let mut sub = executor.subscribe();

    // Let the run reach Charging + the first queued event before cancelling.
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
    executor.cancel();

    let payloads = drain(&mut sub).await;
    assert!(payloads.iter().any(|p| matches!(p, StreamPayload::Status { state,.. } if state == "cancelled")));
    assert_eq!(h.credit_ledger.balance(&user_id).await.unwrap(), 5.0, "operator cancel should refund the charge");
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancel_does_not_refund() {
    let user_id = UserId::from_string("usr-11");
    let job_id = JobId::from_string("job-11");
    let h = harness(vec![
            FakeStep::Event(event("response.created")),
            FakeStep::Pending,
    ]);
    h.credit_ledger.set_balance(&user_id, 5.0);
    h.job_store.seed(user_id.clone(), bare_job_snapshot("job-11"));

    let opts = BeginOptions { create_if_missing: true,..Default::default() };
    let executor = h.registry.begin(user_id.clone(), RunKind::Research, Some(job_id), opts).await.unwrap();
    let mut sub = executor.subscribe();

    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
    h.registry.shutdown().await;

    let payloads = drain(&mut sub).await;
    assert!(payloads.iter().any(|p| matches!(p, StreamPayload::Status { state,.. } if state == "cancelled")));
    assert_eq!(h.credit_ledger.balance(&user_id).await.unwrap(), 4.3, "graceful shutdown must never refund");
}

#[test]
fn research_extras_default_to_medium_effort() {
    let extras = build_request_extras(RunKind::Research, None);
    assert_eq!(extras.get("effort").map(String::as_str), Some("medium"));
}

#[test]
fn research_extras_clamp_unsupported_effort() {
    let extras = build_request_extras(RunKind::Research, Some(oj_core::ReasoningEffort::High));
    assert_eq!(
        extras.get("effort").map(String::as_str),
        Some("medium"),
        "o4-mini-deep-research only supports medium effort"
    );
}

#[test]
fn letter_extras_carry_no_effort() {
    let extras = build_request_extras(RunKind::Letter, Some(oj_core::ReasoningEffort::High));
    assert!(extras.is_empty(), "effort clamping only applies to the research model");
}

#[tokio::test(start_paused = true)]
async fn sweep_retains_a_freshly_terminal_run_and_removes_one_past_ttl_plus_slack() {
    let user_id = UserId::from_string("usr-12");
    let job_id = JobId::from_string("job-12");
    let h = harness(vec![
            FakeStep::Event(event("response.created")),
            FakeStep::Event(ProviderEvent { delta: Some(complete_letter_json()),..event("response.output_text.delta") }),
            FakeStep::Event(event("response.completed")),
    ]);
    h.credit_ledger.set_balance(&user_id, 10.0);
    h.job_store.seed(user_id.clone(), research_ready_job_snapshot("job-12"));
    h.profile_lookup.set(user_id.clone(), profile());

    let opts = BeginOptions { create_if_missing: true, tone: Some(LetterTone::Formal),..Default::default() };
    let executor = h.registry.begin(user_id.clone(), RunKind::Letter, Some(job_id), opts).await.unwrap();
    let run_key = executor.run_key().clone();
    let mut sub = executor.subscribe();
    drain(&mut sub).await;
    assert!(executor.status().is_terminal());

    // Well before TTL + slack: sweep must not touch it.
    tokio::time::advance(Duration::from_secs(60)).await;
    h.registry.sweep().await;
    assert!(h.registry.get(&run_key).is_some(), "sweep removed a recently-terminal run too early");

    // Past the letter TTL (5 min) + slack (2 min): sweep must remove it.
    tokio::time::advance(CLEANUP_TTL + Duration::from_secs(RunKind::Letter.cleanup_slack_secs()) + Duration::from_secs(1)).await;
    h.registry.sweep().await;
    assert!(h.registry.get(&run_key).is_none(), "sweep left a long-terminal run in place");
}
