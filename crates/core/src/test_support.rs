// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::job_snapshot::{JobSnapshot, JobStatus, LetterTone};
use crate::run::{JobId, RunKind, RunState, UserId};

/// Builds a fresh [`RunState`] with test defaults for the given kind/user/job.
pub fn run_state_for(kind: RunKind, user_id: &str, job_id: &str) -> RunState {
    let user_id = UserId::from_string(user_id);
    let job_id = JobId::from_string(job_id);
    RunState::new(kind, user_id, job_id, "test-instance", 1_000)
}

/// A [`JobSnapshot`] whose research has already completed, satisfying the
/// precondition a letter run checks before `Charging`.
pub fn research_ready_job_snapshot(job_id: &str) -> JobSnapshot {
    JobSnapshot {
        job_id: job_id.to_string(),
        research_status: Some(JobStatus::Completed),
        research_content: Some("a researched dossier".to_string()),
        research_response_id: Some("resp-research-1".to_string()),
        letter_tone: Some(LetterTone::Formal),
        ..Default::default()
    }
}

/// A fresh job snapshot with no research yet, for precondition-failure tests.
pub fn bare_job_snapshot(job_id: &str) -> JobSnapshot {
    JobSnapshot { job_id: job_id.to_string(),..Default::default() }
}
