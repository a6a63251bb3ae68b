// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [`RunExecutor`] is the state machine that drives one run end-to-end
//!: charge, stream, resume, poll, persist, complete/error/refund.
//! [`RunRegistry`] is the per-process singleton that resolves a `Begin`
//! call to a live or newly-created executor and routes subscribers to its
//! buffer.

use crate::background_poller::{BackgroundPoller, PollOutcome};
use crate::event_buffer::{EventBuffer, Subscription};
use crate::letter::{self, LetterOutput};
use crate::resume_policy::{ResumeDecision, ResumePolicy};
use crate::stream_adapter::{StreamAdapter, StreamAdapterError};
use oj_adapters::{
    CreditLedger, JobStore, ModelClient, ProfileLookup, RecipientProfile, StreamRequest,
};
use oj_core::{
    clamp_reasoning_effort, AdapterError, Clock, JobId, JobSnapshotPatch, JobStatus, LetterTone,
    OrchestratorError, ReasoningEffort, RequestExtras, ResumeFromState, RunKey, RunKind, RunState,
    RunStatus, StreamPayload, UserId,
};
use oj_storage::{RunStatePatch, RunStateStore};
use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const QUIET_PERIOD: Duration = Duration::from_secs(5);

const QUIET_MESSAGES_RESEARCH: &[&str] = &[
    "Still digging through sources…",
    "Cross-checking the evidence…",
    "Weighing up what we've found so far…",
    "Still working on this…",
];

const QUIET_MESSAGES_LETTER: &[&str] =
&["Still drafting…", "Polishing the wording…", "Still working on this…"];

/// The collaborator handles one run needs. Cheap to clone — every
/// field is already a shared handle.
#[derive(Clone)]
pub struct Collaborators {
    pub credit_ledger: Arc<dyn CreditLedger>,
    pub job_store: Arc<dyn JobStore>,
    pub model_client: Arc<dyn ModelClient>,
    pub profile_lookup: Arc<dyn ProfileLookup>,
    pub run_state_store: Arc<dyn RunStateStore>,
}

/// Options accepted by [`RunRegistry::begin`].
#[derive(Debug, Clone, Default)]
pub struct BeginOptions {
    pub restart: bool,
    pub create_if_missing: bool,
    pub tone: Option<LetterTone>,
    /// Caller-requested reasoning effort (research only). Silently clamped
    /// to `medium` for the deep-research model family.
    pub effort: Option<ReasoningEffort>,
}

/// Why a run's cancellation token was tripped. Graceful shutdown never
/// refunds (the run may still complete on a peer instance after resume);
/// an explicit operator cancel does, if the run was charged and running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CancelReason {
    Operator,
    Shutdown,
}

/// One live run. Owns its [`EventBuffer`] exclusively; the registry holds a
/// shared handle and never reaches past it into subscriber state.
pub struct RunExecutor {
    kind: RunKind,
    run_key: RunKey,
    buffer: EventBuffer,
    cancel_token: CancellationToken,
    cancel_reason: Arc<SyncMutex<Option<CancelReason>>>,
    status: Arc<SyncMutex<RunStatus>>,
    /// Set once, the first time `status` becomes terminal; read by the
    /// registry sweep to decide whether this entry has aged past its
    /// cleanup timer + slack. A `tokio::time::Instant` rather than
    /// `std::time::Instant` so it advances with a paused test clock the
    /// same way the sweep interval and cleanup timer do.
    terminal_at: Arc<SyncMutex<Option<tokio::time::Instant>>>,
}

/// How long a terminal executor is kept around before the primary cleanup
/// timer removes it.
const CLEANUP_TTL: Duration = Duration::from_secs(5 * 60);

impl RunExecutor {
    pub fn run_key(&self) -> &RunKey {
        &self.run_key
    }

    pub fn kind(&self) -> RunKind {
        self.kind
    }

    pub fn subscribe(&self) -> Subscription {
        self.buffer.subscribe()
    }

    pub fn status(&self) -> RunStatus {
        *self.status.lock()
    }

    /// Move to a terminal status, stamping `terminal_at` the first time this
    /// happens. Idempotent: a second call with a different terminal status
    /// never occurs in practice (invariant: monotonic status transitions),
    /// but if it did, the original `terminal_at` stamp would still hold.
    fn mark_terminal(&self, status: RunStatus) {
        *self.status.lock() = status;
        self.terminal_at.lock().get_or_insert_with(tokio::time::Instant::now);
    }

    /// How long ago this executor's status became terminal, or `None` if
    /// it's still running.
    fn age_since_terminal(&self) -> Option<Duration> {
        self.terminal_at.lock().map(|at| at.elapsed())
    }

    /// Explicit operator cancel: abort the stream controller, refund if
    /// charged and still running, mark the store entry cancelled.
    pub fn cancel(&self) {
        *self.cancel_reason.lock() = Some(CancelReason::Operator);
        self.cancel_token.cancel();
    }

    /// Graceful shutdown cancel: abort the stream controller but never
    /// refund — the run may still complete on a peer instance after resume.
    fn cancel_for_shutdown(&self) {
        self.cancel_reason.lock().get_or_insert(CancelReason::Shutdown);
        self.cancel_token.cancel();
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn<C: Clock + 'static>(
        kind: RunKind,
        user_id: UserId,
        job_id: JobId,
        tone: Option<LetterTone>,
        effort: Option<ReasoningEffort>,
        resume_from: Option<ResumeFromState>,
        collaborators: Collaborators,
        clock: C,
        instance_id: String,
        on_terminal: Arc<dyn Fn(RunKey) + Send + Sync>,
    ) -> Arc<Self> {
        let run_key = RunKey::new(kind, &user_id, &job_id);
        let executor = Arc::new(Self {
                kind,
                run_key: run_key.clone(),
                buffer: EventBuffer::new(),
                cancel_token: CancellationToken::new(),
                cancel_reason: Arc::new(SyncMutex::new(None)),
                status: Arc::new(SyncMutex::new(RunStatus::Running)),
                terminal_at: Arc::new(SyncMutex::new(None)),
        });

        let task_executor = executor.clone();
        tokio::spawn(async move {
                task_executor
                .run(user_id, job_id, tone, effort, resume_from, collaborators, clock, instance_id, on_terminal)
                .await;
        });

        executor
    }

    #[allow(clippy::too_many_arguments)]
    async fn run<C: Clock + 'static>(
        self: Arc<Self>,
        user_id: UserId,
        job_id: JobId,
        tone: Option<LetterTone>,
        effort: Option<ReasoningEffort>,
        resume_from: Option<ResumeFromState>,
        collaborators: Collaborators,
        clock: C,
        instance_id: String,
        on_terminal: Arc<dyn Fn(RunKey) + Send + Sync>,
    ) {
        let outcome = self
        .clone()
        .drive(&user_id, &job_id, tone, effort, resume_from, &collaborators, &clock, &instance_id)
        .await;

        if let Err(err) = outcome {
            warn!(run_key = %self.run_key, error = %err, "run ended in error");
        }

        (on_terminal.as_ref())(self.run_key.clone());
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive<C: Clock>(
        self: Arc<Self>,
        user_id: &UserId,
        job_id: &JobId,
        tone: Option<LetterTone>,
        effort: Option<ReasoningEffort>,
        resume_from: Option<ResumeFromState>,
        collaborators: &Collaborators,
        clock: &C,
        instance_id: &str,
    ) -> Result<(), OrchestratorError> {
        let kind = self.kind;
        let already_charged = resume_from.as_ref().map(|r| r.charged).unwrap_or(false);
        let mut response_id = resume_from.as_ref().and_then(|r| r.response_id.clone());
        let mut remaining_credits = resume_from.as_ref().and_then(|r| r.remaining_credits);

        // --- Starting ---
        let now_ms = clock.epoch_ms();
        let mut state = RunState::new(kind, user_id.clone(), job_id.clone(), instance_id, now_ms);
        state.meta.charged = already_charged;
        state.meta.remaining_credits = remaining_credits;
        state.meta.tone = tone.map(|t| t.to_string());
        if let Some(rid) = &response_id {
            state.response_id = Some(rid.clone());
        }
        if collaborators.run_state_store.register(state).await.is_err() {
            // Another instance is already live for this key; bail quietly,
            // the registry already decided this path was safe to take.
        }
        self.buffer.publish(StreamPayload::status("starting", None));

        // --- Charging ---
        let mut charged = already_charged;
        if !charged {
            match collaborators.credit_ledger.deduct(user_id, kind.price()).await {
                Ok(balance) => {
                    charged = true;
                    remaining_credits = Some(balance);
                    let _ = collaborators
                    .run_state_store
                    .update(
                        &self.run_key,
                        RunStatePatch { charged: Some(true), remaining_credits: Some(balance),..Default::default() },
                    )
                    .await;
                    self.buffer.publish(StreamPayload::status("charged", Some(balance)));
                }
                Err(_) => {
                    self.buffer.publish(StreamPayload::Error {
                            message: OrchestratorError::InsufficientCredits.user_message(kind).to_string(),
                            remaining_credits: None,
                    });
                    collaborators.run_state_store.remove(&self.run_key).await;
                    self.mark_terminal(RunStatus::Error);
                    return Err(OrchestratorError::InsufficientCredits);
                }
            }
        }

        // Profile is fetched once, up front, so the live letter preview can
        // render the same addressed template as the final document.
        let profile = if kind == RunKind::Letter {
            Some(collaborators.profile_lookup.get(user_id).await.map_err(OrchestratorError::Adapter)?)
        } else {
            None
        };

        let extras: RequestExtras = build_request_extras(kind, effort);
        let mut resume_policy = ResumePolicy::new();
        let mut raw_buffer = String::new();
        let mut research_text = String::new();

        let mut stream = if let Some(rid) = response_id.clone() {
            let resumed = collaborators
            .model_client
            .resume_stream(&rid, None, None, &extras)
            .await
            .map_err(OrchestratorError::Adapter)?;
            StreamAdapter::for_kind(resumed, kind)
        } else {
            let request = build_stream_request(kind, job_id, &extras);
            let created = collaborators.model_client.create_stream(request).await.map_err(OrchestratorError::Adapter)?;
            StreamAdapter::for_kind(created, kind)
        };

        let mut quiet_index: usize = 0;
        let mut last_quiet_index: Option<usize> = None;
        // A fixed deadline rather than a sleep recreated every loop turn: it
        // must only move when an inbound event or the quiet-period payload
        // itself resets it, not every time the loop cycles through the
        // heartbeat branch below.
        let mut quiet_deadline = tokio::time::Instant::now() + QUIET_PERIOD;

        // Cheap refresh-only path, independent of the quiet-period timer:
        // callers MUST heartbeat at least once per second while a run is
        // producing events or blocked waiting ( 4.1, 5 "suspension points").
        let mut heartbeat_tick = tokio::time::interval(Duration::from_secs(1));
        heartbeat_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let outcome: RunOutcome = 'live: loop {
            if self.cancel_token.is_cancelled() {
                break 'live RunOutcome::Cancelled;
            }

            let next = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => {
                    break 'live RunOutcome::Cancelled;
                }
                event = stream.next() => event,
                _ = heartbeat_tick.tick() => {
                    let _ = collaborators.run_state_store.heartbeat(&self.run_key, None).await;
                    continue 'live;
                }
                _ = tokio::time::sleep_until(quiet_deadline) => {
                    let messages = quiet_messages(kind);
                    let mut idx = quiet_index % messages.len();
                    if kind == RunKind::Research {
                        if let Some(last) = last_quiet_index {
                            if idx == last {
                                idx = (idx + 1) % messages.len();
                            }
                        }
                    }
                    self.buffer.publish(StreamPayload::quiet_period(messages[idx]));
                    last_quiet_index = Some(idx);
                    quiet_index = idx + 1;
                    quiet_deadline = tokio::time::Instant::now() + QUIET_PERIOD;
                    continue 'live;
                }
            };

            match next {
                Some(Ok(event)) => {
                    quiet_deadline = tokio::time::Instant::now() + QUIET_PERIOD;
                    resume_policy.observe(&event);

                    if let Some(rid) = event.response_id.clone() {
                        if response_id.is_none() {
                            response_id = Some(rid.clone());
                            capture_response_id(&self, collaborators, user_id, kind, &rid).await;
                        }
                    }

                    match classify_event(&event.event_type) {
                        EventKind::Created | EventKind::Queued => {
                            self.buffer.publish(StreamPayload::status("queued", None));
                        }
                        EventKind::InProgress => {
                            self.buffer.publish(StreamPayload::status("in_progress", None));
                        }
                        EventKind::Delta | EventKind::Done => {
                            self.handle_delta(kind, &event, &mut raw_buffer, &mut research_text, profile.as_ref());
                        }
                        EventKind::Failed | EventKind::Incomplete => {
                            let message = event
                            .message
                            .clone()
                            .unwrap_or_else(|| "the provider reported a terminal failure".to_string());
                            break 'live RunOutcome::ProviderFailed(message);
                        }
                        EventKind::Completed => {
                            break 'live RunOutcome::StreamCompleted;
                        }
                        EventKind::Other => {
                            self.buffer.publish(StreamPayload::Event { payload: event.raw.clone() });
                        }
                    }
                }
                Some(Err(err)) => {
                    let adapter_err = to_adapter_error(err);
                    match resume_policy.on_failure(&adapter_err, response_id.is_some()) {
                        ResumeDecision::Fresh { message } => {
                            response_id = None;
                            self.buffer.publish(StreamPayload::resume_event(0, message));
                            let request = build_stream_request(kind, job_id, &extras);
                            match collaborators.model_client.create_stream(request).await {
                                Ok(fresh) => stream = StreamAdapter::for_kind(fresh, kind),
                                Err(err) => break 'live RunOutcome::ProviderFailed(err.to_string()),
                            }
                        }
                        ResumeDecision::Resume { attempt, delay, message, cursor, sequence_number } => {
                            let Some(rid) = response_id.clone() else {
                                // The policy only returns `Resume` when a responseId was
                                // already known; treat anything else as a programming
                                // error surfaced as a background-polling fallback.
                                break 'live RunOutcome::ProviderFailed(
                                    "resume requested without a known response id".to_string(),
                                );
                            };
                            tokio::time::sleep(delay).await;
                            self.buffer.publish(StreamPayload::resume_event(attempt, message));
                            match collaborators
                            .model_client
                            .resume_stream(&rid, cursor.as_deref(), sequence_number, &extras)
                            .await
                            {
                                Ok(resumed) => stream = StreamAdapter::for_kind(resumed, kind),
                                Err(err) => break 'live RunOutcome::ProviderFailed(err.to_string()),
                            }
                        }
                        ResumeDecision::GiveUpToPolling => {
                            if let Some(rid) = response_id.clone() {
                                break 'live RunOutcome::NeedsBackgroundPolling(rid);
                            }
                            break 'live RunOutcome::ProviderFailed(
                                "the connection was interrupted and could not be resumed".to_string(),
                            );
                        }
                        ResumeDecision::Fail { message } => {
                            break 'live RunOutcome::ProviderFailed(message);
                        }
                    }
                }
                None => break 'live RunOutcome::StreamCompleted,
            }
        };

        let outcome = match outcome {
            RunOutcome::NeedsBackgroundPolling(rid) => {
                self.buffer.publish(StreamPayload::status("background_polling", None));
                let budget = Duration::from_secs(kind.polling_budget_secs());
                match BackgroundPoller::run(collaborators.model_client.as_ref(), &rid, budget).await {
                    PollOutcome::Completed { content } => {
                        if kind == RunKind::Letter {
                            if let Some(content) = content {
                                raw_buffer = content;
                            }
                        } else if let Some(content) = content {
                            research_text = content;
                        }
                        RunOutcome::StreamCompleted
                    }
                    PollOutcome::Failed | PollOutcome::Cancelled | PollOutcome::Incomplete => {
                        RunOutcome::ProviderFailed("background polling ended without a usable result".to_string())
                    }
                    PollOutcome::TimedOut => RunOutcome::TimedOut,
                }
            }
            other => other,
        };

        match outcome {
            RunOutcome::Cancelled => {
                let reason = *self.cancel_reason.lock();
                let mut remaining_credits = remaining_credits;
                if charged && reason == Some(CancelReason::Operator) {
                    match collaborators.credit_ledger.refund(user_id, kind.price()).await {
                        Ok(balance) => remaining_credits = Some(balance),
                        Err(err) => warn!(run_key = %self.run_key, error = %err, "refund on operator cancel failed"),
                    }
                }
                let _ = collaborators
                .run_state_store
                .update(&self.run_key, RunStatePatch::status(RunStatus::Cancelled))
                .await;
                self.mark_terminal(RunStatus::Cancelled);
                self.buffer.publish(StreamPayload::status("cancelled", remaining_credits));
                self.buffer.close();
                Ok(())
            }
            RunOutcome::StreamCompleted => {
                // Any Persisting-stage failure (a bad profile lookup, a
                // malformed letter document, a job-store write failure)
                // must go through `fail` the same as a provider or timeout
                // error: refund, write `<kind>Status=error`, publish
                // `error{...}`, mark terminal. `persist` never does any of
                // that itself — it only reports what went wrong.
                match self
                .persist(
                    user_id,
                    kind,
                    collaborators,
                    profile.as_ref(),
                    &raw_buffer,
                    &research_text,
                    response_id.clone(),
                    remaining_credits,
                )
                .await
                {
                    Ok(()) => Ok(()),
                    Err(err) => self.fail(user_id, kind, collaborators, charged, remaining_credits, err).await,
                }
            }
            RunOutcome::ProviderFailed(message) => {
                self.fail(
                    user_id,
                    kind,
                    collaborators,
                    charged,
                    remaining_credits,
                    OrchestratorError::ProviderTerminalFailure(message),
                )
                .await
            }
            RunOutcome::TimedOut => {
                self.fail(
                    user_id,
                    kind,
                    collaborators,
                    charged,
                    remaining_credits,
                    OrchestratorError::TimeoutExceeded,
                )
                .await
            }
            RunOutcome::NeedsBackgroundPolling(_) => unreachable!("resolved above"),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_delta(
        &self,
        kind: RunKind,
        event: &oj_core::ProviderEvent,
        raw_buffer: &mut String,
        research_text: &mut String,
        profile: Option<&RecipientProfile>,
    ) {
        match kind {
            RunKind::Letter => {
                if let Some(delta) = &event.delta {
                    raw_buffer.push_str(delta);
                    self.buffer.publish(StreamPayload::Delta { text: delta.clone() });
                }
                let preview = letter::extract_preview(raw_buffer);
                if let Some(profile) = profile {
                    let html = letter::render_preview_html(profile, &preview);
                    self.buffer.publish(StreamPayload::LetterDelta { html });
                }
            }
            RunKind::Research => {
                if let Some(snapshot) = &event.snapshot {
                    if snapshot.len() > research_text.len() {
                        let grown = snapshot[research_text.len()..].to_string();
                        *research_text = snapshot.clone();
                        self.buffer.publish(StreamPayload::Delta { text: grown });
                    }
                } else if let Some(delta) = &event.delta {
                    research_text.push_str(delta);
                    self.buffer.publish(StreamPayload::Delta { text: delta.clone() });
                }
            }
        }
    }

    /// Parse/merge/render and write the terminal artifact, then publish
    /// `complete{...}`. Never refunds or publishes `error{...}` itself — any
    /// failure here is reported to the caller, which routes it through
    /// `fail` the same way a provider or timeout failure is.
    #[allow(clippy::too_many_arguments)]
    async fn persist(
        &self,
        user_id: &UserId,
        kind: RunKind,
        collaborators: &Collaborators,
        profile: Option<&RecipientProfile>,
        raw_buffer: &str,
        research_text: &str,
        response_id: Option<String>,
        remaining_credits: Option<f64>,
    ) -> Result<(), OrchestratorError> {
        let response_id = response_id.unwrap_or_default();
        let (patch, content_for_complete, letter_json) = match kind {
            RunKind::Research => (
                JobSnapshotPatch {
                    research_status: Some(JobStatus::Completed),
                    research_content: Some(research_text.to_string()),
                    research_response_id: Some(response_id.clone()),
                    ..Default::default()
                },
                Some(research_text.to_string()),
                None,
            ),
            RunKind::Letter => {
                let profile = profile.ok_or_else(|| {
                        OrchestratorError::PreconditionNotMet("no recipient profile available".to_string())
                })?;
                let parsed = letter::parse_letter_json(raw_buffer)?;
                let merged = letter::merge_with_profile(parsed, profile);
                let html = letter::render_letter_html(&merged);
                let json = serde_json::to_value(&merged).unwrap_or(serde_json::json!({}));
                (
                    JobSnapshotPatch {
                        letter_status: Some(JobStatus::Completed),
                        letter_content: Some(html.clone()),
                        letter_references: Some(merged.references.clone()),
                        letter_response_id: Some(response_id.clone()),
                        letter_json: Some(json.clone()),
                        ..Default::default()
                    },
                    Some(html),
                    Some(json),
                )
            }
        };

        collaborators.job_store.upsert(user_id, patch).await.map_err(OrchestratorError::Adapter)?;
        let _ = collaborators
        .run_state_store
        .update(&self.run_key, RunStatePatch::status(RunStatus::Completed))
        .await;
        self.mark_terminal(RunStatus::Completed);

        self.buffer.publish(StreamPayload::Complete {
                content: content_for_complete,
                letter: letter_json,
                response_id,
                remaining_credits,
                usage: None,
        });
        info!(run_key = %self.run_key, "run completed");
        Ok(())
    }

    async fn fail(
        &self,
        user_id: &UserId,
        kind: RunKind,
        collaborators: &Collaborators,
        charged: bool,
        remaining_credits: Option<f64>,
        error: OrchestratorError,
    ) -> Result<(), OrchestratorError> {
        let mut remaining_credits = remaining_credits;
        if charged && error.refunds_on_error() {
            match collaborators.credit_ledger.refund(user_id, kind.price()).await {
                Ok(balance) => remaining_credits = Some(balance),
                Err(err) => warn!(run_key = %self.run_key, error = %err, "refund failed"),
            }
        }

        let status_patch = match kind {
            RunKind::Research => JobSnapshotPatch { research_status: Some(JobStatus::Error),..Default::default() },
            RunKind::Letter => JobSnapshotPatch { letter_status: Some(JobStatus::Error),..Default::default() },
        };
        let _ = collaborators.job_store.upsert(user_id, status_patch).await;
        let _ = collaborators
        .run_state_store
        .update(&self.run_key, RunStatePatch::status(RunStatus::Error))
        .await;
        self.mark_terminal(RunStatus::Error);

        self.buffer.publish(StreamPayload::Error {
                message: error.user_message(kind).to_string(),
                remaining_credits,
        });
        Err(error)
    }
}

enum RunOutcome {
    StreamCompleted,
    NeedsBackgroundPolling(String),
    ProviderFailed(String),
    TimedOut,
    Cancelled,
}

enum EventKind {
    Created,
    Queued,
    InProgress,
    Delta,
    Done,
    Failed,
    Incomplete,
    Completed,
    Other,
}

fn classify_event(event_type: &str) -> EventKind {
    match event_type {
        "response.created" => EventKind::Created,
        "response.queued" => EventKind::Queued,
        "response.in_progress" => EventKind::InProgress,
        "response.output_text.delta" => EventKind::Delta,
        "response.output_text.done" => EventKind::Done,
        "response.failed" => EventKind::Failed,
        "response.incomplete" => EventKind::Incomplete,
        "response.completed" => EventKind::Completed,
        _ => EventKind::Other,
    }
}

fn quiet_messages(kind: RunKind) -> &'static [&'static str] {
    match kind {
        RunKind::Research => QUIET_MESSAGES_RESEARCH,
        RunKind::Letter => QUIET_MESSAGES_LETTER,
    }
}

fn to_adapter_error(err: StreamAdapterError) -> AdapterError {
    match err {
        StreamAdapterError::TimeoutExceeded => AdapterError::Transport("timed out".to_string()),
        StreamAdapterError::Cancelled => AdapterError::Other("cancelled".to_string()),
        StreamAdapterError::Adapter(inner) => inner,
    }
}

async fn capture_response_id(
    executor: &Arc<RunExecutor>,
    collaborators: &Collaborators,
    user_id: &UserId,
    kind: RunKind,
    response_id: &str,
) {
    let patch = match kind {
        RunKind::Research => {
            JobSnapshotPatch { research_response_id: Some(response_id.to_string()),..Default::default() }
        }
        RunKind::Letter => {
            JobSnapshotPatch { letter_response_id: Some(response_id.to_string()),..Default::default() }
        }
    };
    let _ = collaborators.job_store.upsert(user_id, patch).await;
    let _ = collaborators
    .run_state_store
    .update(&executor.run_key(), RunStatePatch::response_id(response_id))
    .await;
}

fn build_stream_request(kind: RunKind, job_id: &JobId, extras: &RequestExtras) -> StreamRequest {
    let model = match kind {
        RunKind::Research => "o4-mini-deep-research".to_string(),
        RunKind::Letter => "gpt-4.1".to_string(),
    };
    StreamRequest { kind, model, input: job_id.as_str().to_string(), extras: extras.clone() }
}

/// Research runs talk to `o4-mini-deep-research`, which only accepts
/// `medium` effort. Requests for anything else are silently
/// downgraded — logged, not surfaced to the caller.
fn build_request_extras(kind: RunKind, effort: Option<ReasoningEffort>) -> RequestExtras {
    let mut extras = RequestExtras::new();
    if kind != RunKind::Research {
        return extras;
    }
    let requested = effort.unwrap_or(ReasoningEffort::Medium);
    let clamped = clamp_reasoning_effort("o4-mini-deep-research", requested);
    if clamped != requested {
        warn!(?requested, ?clamped, "reasoning effort not supported by this model, downgrading");
    }
    let value = match clamped {
        ReasoningEffort::Low => "low",
        ReasoningEffort::Medium => "medium",
        ReasoningEffort::High => "high",
    };
    extras.insert("effort".to_string(), value.to_string());
    extras
}

/// Singleton per process: resolves `Begin`/`Subscribe` to a live or
/// newly-created [`RunExecutor`].
pub struct RunRegistry<C: Clock + 'static> {
    executors: SyncMutex<HashMap<RunKey, Arc<RunExecutor>>>,
    collaborators: Collaborators,
    clock: C,
    instance_id: String,
}

impl<C: Clock + 'static> RunRegistry<C> {
    pub fn new(collaborators: Collaborators, clock: C, instance_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
                executors: SyncMutex::new(HashMap::new()),
                collaborators,
                clock,
                instance_id: instance_id.into(),
        })
    }

    pub fn get(&self, run_key: &RunKey) -> Option<Arc<RunExecutor>> {
        self.executors.lock().get(run_key).cloned()
    }

    fn remove(&self, run_key: &RunKey) {
        self.executors.lock().remove(run_key);
    }

    /// All run keys this process currently holds a live executor for.
    /// Backs the `oj runs list` operator surface.
    pub fn list_run_keys(&self) -> Vec<RunKey> {
        self.executors.lock().keys().cloned().collect()
    }

    /// Number of in-process executors not yet in a terminal status.
    pub fn running_count(&self) -> usize {
        self.executors.lock().values().filter(|e| !e.status().is_terminal()).count()
    }

    /// Resolve `jobId` (defaulting to the user's active job), compute the
    /// run key, then apply the restart/resume/orphan policy.
    pub async fn begin(
        self: &Arc<Self>,
        user_id: UserId,
        kind: RunKind,
        job_id: Option<JobId>,
        opts: BeginOptions,
    ) -> Result<Arc<RunExecutor>, OrchestratorError> {
        let snapshot = self
        .collaborators
        .job_store
        .get(&user_id)
        .await
        .map_err(OrchestratorError::Adapter)?
        .ok_or(OrchestratorError::PreconditionNotMet("no active job".to_string()))?;

        let job_id = match job_id {
            Some(id) => {
                if id.as_str() != snapshot.job_id {
                    return Err(OrchestratorError::PreconditionNotMet("job id mismatch".to_string()));
                }
                id
            }
            None => JobId::from_string(&snapshot.job_id),
        };

        if kind == RunKind::Letter && !snapshot.has_research_for_letter() {
            return Err(OrchestratorError::PreconditionNotMet(
                    "research must complete before composing the letter".to_string(),
            ));
        }
        if kind == RunKind::Letter && opts.tone.is_none() {
            return Err(OrchestratorError::PreconditionNotMet("letter tone is required".to_string()));
        }

        let run_key = RunKey::new(kind, &user_id, &job_id);

        if let Some(existing) = self.get(&run_key) {
            if !opts.restart {
                return Ok(existing);
            }
            if existing.status() == RunStatus::Running {
                return Err(OrchestratorError::AlreadyRunning);
            }
            existing.buffer.close();
            self.remove(&run_key);
        }

        let resume_from = match self.collaborators.run_state_store.get(&run_key).await {
            Some(stored) if stored.response_id.is_some() => Some(ResumeFromState {
                    response_id: stored.response_id,
                    charged: stored.meta.charged,
                    remaining_credits: stored.meta.remaining_credits,
            }),
            Some(stored) => {
                // Never made it past Charging cleanly: orphaned entry.
                // Refund if charged, persist <kind>Status=error, then remove
                // the store entry.
                if stored.meta.charged {
                    let _ = self.collaborators.credit_ledger.refund(&user_id, kind.price()).await;
                }
                let status_patch = match kind {
                    RunKind::Research => {
                        JobSnapshotPatch { research_status: Some(JobStatus::Error),..Default::default() }
                    }
                    RunKind::Letter => {
                        JobSnapshotPatch { letter_status: Some(JobStatus::Error),..Default::default() }
                    }
                };
                let _ = self.collaborators.job_store.upsert(&user_id, status_patch).await;
                self.collaborators.run_state_store.remove(&run_key).await;
                if !opts.create_if_missing {
                    return Err(OrchestratorError::NoRunToResume);
                }
                None
            }
            None => {
                if !opts.create_if_missing {
                    return Err(OrchestratorError::NoRunToResume);
                }
                None
            }
        };

        self.spawn_executor(kind, user_id, job_id, opts.tone, opts.effort, resume_from)
    }

    fn spawn_executor(
        self: &Arc<Self>,
        kind: RunKind,
        user_id: UserId,
        job_id: JobId,
        tone: Option<LetterTone>,
        effort: Option<ReasoningEffort>,
        resume_from: Option<ResumeFromState>,
    ) -> Result<Arc<RunExecutor>, OrchestratorError> {
        let run_key = RunKey::new(kind, &user_id, &job_id);
        let registry = self.clone();
        let on_terminal: Arc<dyn Fn(RunKey) + Send + Sync> = Arc::new(move |key: RunKey| {
                let registry = registry.clone();
                tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
                        registry.remove(&key);
                        registry.collaborators.run_state_store.remove(&key).await;
                });
        });

        let executor = RunExecutor::spawn(
            kind,
            user_id,
            job_id,
            tone,
            effort,
            resume_from,
            self.collaborators.clone(),
            self.clock.clone(),
            self.instance_id.clone(),
            on_terminal,
        );
        self.executors.lock().insert(run_key, executor.clone());
        Ok(executor)
    }

    /// Subscribe to an already-live run (`Subscribe`).
    pub fn subscribe(&self, run_key: &RunKey) -> Option<Subscription> {
        self.get(run_key).map(|executor| executor.subscribe())
    }

    /// Remove registry/store entries for terminal runs older than their TTL
    /// plus slack ("Cleanup"). Intended to be called periodically by
    /// the process hosting this registry.
    pub async fn sweep(&self) {
        let stale: Vec<RunKey> = self
        .executors
        .lock()
        .iter()
        .filter(|(_, executor)| {
            executor.age_since_terminal().is_some_and(|age| {
                age >= CLEANUP_TTL + Duration::from_secs(executor.kind().cleanup_slack_secs())
            })
        })
        .map(|(key, _)| key.clone())
        .collect();
        for key in stale {
            self.remove(&key);
            self.collaborators.run_state_store.remove(&key).await;
        }
    }

    /// Graceful shutdown: mark every in-process running executor
    /// cancelled in the store and stop. No refund — the run may still
    /// complete on a peer instance after resume.
    pub async fn shutdown(&self) {
        let all: Vec<Arc<RunExecutor>> = self.executors.lock().values().cloned().collect();
        for executor in all {
            executor.cancel_for_shutdown();
            let _ = self
            .collaborators
            .run_state_store
            .update(executor.run_key(), RunStatePatch::status(RunStatus::Cancelled))
            .await;
        }
    }
}

#[cfg(test)]
#[path = "run_executor_tests.rs"]
mod tests;
