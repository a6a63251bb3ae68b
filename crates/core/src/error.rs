// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The error-kind catalog from. Every variant here is a terminal or
//! internal-recovery outcome the orchestrator itself distinguishes; user-
//! visible text stays a short, stable catalog (see [`OrchestratorError::user_message`])
//! rather than leaking provider detail to the client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("no user id on request")]
    Unauthorized,

    #[error("precondition not met: {0}")]
    PreconditionNotMet(String),

    #[error("a run is already active for this job")]
    AlreadyRunning,

    #[error("no run to resume")]
    NoRunToResume,

    #[error("insufficient credits")]
    InsufficientCredits,

    #[error("transport interrupted: {0}")]
    TransportInterrupted(String),

    #[error("resume budget exhausted after {attempts} attempts")]
    ResumeExhausted { attempts: u32 },

    #[error("timed out waiting for a terminal state")]
    TimeoutExceeded,

    #[error("failed to parse model output: {0}")]
    OutputParseFailed(String),

    #[error("provider reported a terminal failure: {0}")]
    ProviderTerminalFailure(String),

    #[error("run was cancelled")]
    Cancelled,

    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

impl OrchestratorError {
    /// Whether this error refunds the held charge (Errored transition, table).
    pub fn refunds_on_error(&self) -> bool {
        !matches!(self, OrchestratorError::Cancelled)
    }

    /// A short, stable message safe to show a client. Never echoes provider detail.
    pub fn user_message(&self, kind: crate::run::RunKind) -> &'static str {
        use crate::run::RunKind;
        match self {
            OrchestratorError::Unauthorized => "You need to sign in to do that.",
            OrchestratorError::PreconditionNotMet(_) => match kind {
                RunKind::Letter => "Run deep research before composing the letter.",
                RunKind::Research => "This job isn't ready for research yet.",
            },
            OrchestratorError::AlreadyRunning => "This job already has a run in progress.",
            OrchestratorError::NoRunToResume => "There's nothing to resume.",
            OrchestratorError::InsufficientCredits => "You don't have enough credits for this.",
            OrchestratorError::TransportInterrupted(_) => "The connection was interrupted.",
            OrchestratorError::ResumeExhausted {.. } => "We're still working on this in the background.",
            OrchestratorError::TimeoutExceeded => match kind {
                RunKind::Letter => "Letter composition timed out. Please try again.",
                RunKind::Research => "Deep research timed out. Please try again.",
            },
            OrchestratorError::OutputParseFailed(_) => match kind {
                RunKind::Letter => "Letter composition failed. Please try again in a few moments.",
                RunKind::Research => "Research failed. Please try again in a few moments.",
            },
            OrchestratorError::ProviderTerminalFailure(_) => match kind {
                RunKind::Letter => "Letter composition failed. Please try again in a few moments.",
                RunKind::Research => "Research failed. Please try again in a few moments.",
            },
            OrchestratorError::Cancelled => "This run was cancelled.",
            OrchestratorError::Adapter(_) => "Something went wrong talking to an upstream service.",
        }
    }
}

/// Errors a collaborator adapter (`ModelClient`, `CreditLedger`, `JobStore`,
/// `ProfileLookup`) can raise. Kept separate from [`OrchestratorError`] so
/// adapter crates don't need to depend back on run-level semantics.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("ledger balance too low")]
    InsufficientBalance,

    #[error("store conflict: {0}")]
    Conflict(String),

    #[error("unexpected adapter failure: {0}")]
    Other(String),
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
