// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [`StreamPayload`] is what subscribers receive from a run. It is
//! published in producer order by `EventBuffer` and the first `Complete`/
//! `Error` variant is terminal.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One item in a run's output stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamPayload {
    /// Coarse-grained run state transition the client should surface.
    Status { state: String, #[serde(skip_serializing_if = "Option::is_none")] remaining_credits: Option<f64> },
    /// Incremental raw output chunk.
    Delta { text: String },
    /// Pass-through provider event (reasoning, search progress, quiet-period heartbeats, resume notices).
    Event { #[serde(flatten)] payload: Value },
    /// Letter-specific rendered preview.
    LetterDelta { html: String },
    /// Terminal success.
    Complete {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        letter: Option<Value>,
        response_id: String,
        remaining_credits: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<UsageInfo>,
    },
    /// Terminal failure.
    Error { message: String, #[serde(skip_serializing_if = "Option::is_none")] remaining_credits: Option<f64> },
}

impl StreamPayload {
    /// Whether this payload closes the buffer (contract).
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamPayload::Complete {.. } | StreamPayload::Error {.. })
    }

    pub fn status(state: impl Into<String>, remaining_credits: Option<f64>) -> Self {
        StreamPayload::Status { state: state.into(), remaining_credits }
    }

    pub fn resume_event(attempt: u32, message: impl Into<String>) -> Self {
        StreamPayload::Event {
            payload: serde_json::json!({
                    "kind": "resume_attempt",
                    "attempt": attempt,
                    "message": message.into(),
            }),
        }
    }

    pub fn quiet_period(message: impl Into<String>) -> Self {
        StreamPayload::Event {
            payload: serde_json::json!({ "kind": "quiet_period", "message": message.into() }),
        }
    }
}

/// Provider-reported token usage, carried through on `Complete` when available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageInfo {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// A single event surfaced by [`crate::model_client`]-shaped collaborators.
/// This is intentionally a thin, mostly-opaque envelope: the orchestrator
/// only branches on `event_type`, `response_id`, and the cursor fields; the
/// remaining payload passes straight through to `StreamPayload::Event`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProviderEvent {
    pub event_type: String,
    #[serde(default)]
    pub response_id: Option<String>,
    #[serde(default)]
    pub sequence_number: Option<u64>,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub delta: Option<String>,
    #[serde(default)]
    pub snapshot: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub raw: Value,
}

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;
