// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol for the operator surface. Wire format: 4-byte big-endian
//! length prefix + JSON payload.
//!
//! This protocol is deliberately small: the only thing an operator needs
//! from a running orchestrator is to list the runs a process currently
//! holds live, inspect one run's `RunState`, and issue the explicit
//! operator `Cancel(runKey)`.

use oj_core::{RunKey, RunKind, RunStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Request sent from `oj` (the CLI) to `ojd` (the daemon).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check.
    Ping,
    /// List every run this process currently holds a live executor for.
    ListRuns,
    /// Fetch one run's current state by its run key string (`key`).
    GetRun { run_key: String },
    /// Issue the explicit operator cancel from.
    CancelRun { run_key: String },
}

/// Response sent from `ojd` back to `oj`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    Pong,
    Runs { runs: Vec<RunSummary> },
    Run { run: Option<RunSummary> },
    Cancelled,
    Error { message: String },
}

/// One run as surfaced to an operator — a flattened, display-friendly
/// projection of `RunState`, not the record itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub run_key: String,
    pub kind: RunKind,
    pub user_id: String,
    pub job_id: String,
    pub status: RunStatus,
    pub charged: bool,
    pub remaining_credits: Option<f64>,
    pub response_id: Option<String>,
}

impl RunSummary {
    pub fn from_state(state: &oj_core::RunState) -> Self {
        Self {
            run_key: state.run_key.to_string(),
            kind: state.kind,
            user_id: state.user_id.as_str().to_string(),
            job_id: state.job_id.as_str().to_string(),
            status: state.status,
            charged: state.meta.charged,
            remaining_credits: state.meta.remaining_credits,
            response_id: state.response_id.clone(),
        }
    }
}

/// Whether a `RunKey`'s rendered form (`{kind}:{userId}::{jobId}`) matches
/// the operator-supplied string. `RunKey` has no public constructor from an
/// opaque string, so lookups by run key compare string forms instead.
pub fn run_key_matches(run_key: &RunKey, candidate: &str) -> bool {
    run_key.as_str() == candidate
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("message exceeds maximum frame size ({0} bytes)")]
    TooLarge(usize),
}

/// Maximum accepted frame size; guards against a misbehaving client driving
/// unbounded allocation.
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
