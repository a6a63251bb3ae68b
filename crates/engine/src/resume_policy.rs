// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [`ResumePolicy`] classifies a streaming failure and decides whether, and
//! how, the run should recover. It does not itself touch the
//! network or the event buffer — `RunExecutor` asks it for a decision and
//! acts on it.

use oj_core::{AdapterError, ProviderEvent};
use rand::Rng;
use std::time::Duration;

/// Maximum resume attempts before giving up live streaming.
pub const MAX_ATTEMPTS: u32 = 10;

const RESUME_MESSAGES: &[&str] = &[
    "Connection dropped. Reconnecting…",
    "Lost the upstream connection, picking back up…",
    "Network hiccup. Resuming the stream…",
];

const FRESH_STREAM_MESSAGE: &str =
"The previous response is no longer available upstream. Starting a fresh stream…";

const RECOVERABLE_SUBSTRINGS: &[&str] = &[
    "econnreset",
    "econnaborted",
    "etimedout",
    "epipe",
    "enotfound",
    "premature close",
    "socket hang up",
    "connection reset",
    "connection closed",
    "reset by peer",
    "http/2 stream closed",
    "underlying socket was closed",
    "server hung up",
    "timed out",
    "fetch failed",
];

/// What [`ResumePolicy::on_failure`] decided should happen next.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeDecision {
    /// The provider evicted the prior response; discard it and request a
    /// brand-new stream from the caller's original prompt.
    Fresh { message: String },
    /// Sleep `delay`, emit `message`, then call `ModelClient::resume_stream`
    /// with the tracked cursor/sequence number.
    Resume {
        attempt: u32,
        delay: Duration,
        message: String,
        cursor: Option<String>,
        sequence_number: Option<u64>,
    },
    /// Recoverable in kind, but no `responseId` is known yet or the attempt
    /// budget is spent; the caller falls back to background polling if a
    /// `responseId` is known, else fails the run.
    GiveUpToPolling,
    /// Not recoverable at all; fail the run with this message.
    Fail { message: String },
}

/// Per-run resume state: attempt counter and the cursors needed to resume
/// from the right place ("Ordering/cursors").
#[derive(Debug, Clone, Default)]
pub struct ResumePolicy {
    attempt: u32,
    last_cursor: Option<String>,
    last_sequence_number: Option<u64>,
}

impl ResumePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn last_cursor(&self) -> Option<&str> {
        self.last_cursor.as_deref()
    }

    pub fn last_sequence_number(&self) -> Option<u64> {
        self.last_sequence_number
    }

    /// Track the cursor/sequence number carried by an inbound event, if any.
    pub fn observe(&mut self, event: &ProviderEvent) {
        if let Some(cursor) = &event.cursor {
            self.last_cursor = Some(cursor.clone());
        }
        if let Some(seq) = event.sequence_number {
            self.last_sequence_number = Some(seq);
        }
    }

    /// Reset attempt counter and cursors — used when a fresh stream is
    /// started (step 1) since the old cursors no longer mean anything.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.last_cursor = None;
        self.last_sequence_number = None;
    }

    /// Classify `err` and decide what to do. `response_id_known` tells the
    /// policy whether a `responseId` has been captured yet for this run.
    pub fn on_failure(&mut self, err: &AdapterError, response_id_known: bool) -> ResumeDecision {
        match classify(err) {
            ErrorClass::MissingResponse => {
                self.reset();
                ResumeDecision::Fresh { message: FRESH_STREAM_MESSAGE.to_string() }
            }
            ErrorClass::RecoverableTransport => {
                if !response_id_known || self.attempt >= MAX_ATTEMPTS {
                    return ResumeDecision::GiveUpToPolling;
                }
                self.attempt += 1;
                let delay = backoff_delay(self.attempt);
                let message = RESUME_MESSAGES[(self.attempt as usize - 1) % RESUME_MESSAGES.len()];
                ResumeDecision::Resume {
                    attempt: self.attempt,
                    delay,
                    message: message.to_string(),
                    cursor: self.last_cursor.clone(),
                    sequence_number: self.last_sequence_number,
                }
            }
            ErrorClass::NonRecoverable => ResumeDecision::Fail { message: err.to_string() },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorClass {
    RecoverableTransport,
    MissingResponse,
    NonRecoverable,
}

fn classify(err: &AdapterError) -> ErrorClass {
    match err {
        AdapterError::NotFound(message) if message.to_lowercase().contains("not found") => {
            ErrorClass::MissingResponse
        }
        AdapterError::Transport(message) if is_recoverable_message(message) => {
            ErrorClass::RecoverableTransport
        }
        _ => ErrorClass::NonRecoverable,
    }
}

fn is_recoverable_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RECOVERABLE_SUBSTRINGS.iter().any(|needle| lower.contains(needle))
}

/// `min(1000 * 2^(attempt-1), 5000)` ms plus `[0, 300)` ms jitter (step 2c).
pub fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = 1000u64.saturating_mul(1u64 << attempt.saturating_sub(1).min(62));
    let base_ms = base_ms.min(5000);
    let jitter_ms = rand::thread_rng().gen_range(0..300);
    Duration::from_millis(base_ms + jitter_ms)
}

#[cfg(test)]
#[path = "resume_policy_tests.rs"]
mod tests;
