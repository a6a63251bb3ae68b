// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run identity and the persisted [`RunState`] record.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

crate::define_id! {
    /// Identifies the user on whose behalf a run executes.
    pub struct UserId("usr-");
}

crate::define_id! {
    /// Caller-owned identifier of the job a run is attached to.
    pub struct JobId("job-");
}

/// Which kind of streamed job this run drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Research,
    Letter,
}

crate::simple_display! {
    RunKind {
        Research => "research",
        Letter => "letter",
    }
}

impl RunKind {
    /// Inactivity budget before [`crate::run::RunKind`]'s stream is considered stalled.
    pub fn inactivity_budget_secs(self) -> u64 {
        match self {
            RunKind::Letter => 180,
            RunKind::Research => 600,
        }
    }

    /// Total background-polling budget after live streaming is abandoned.
    pub fn polling_budget_secs(self) -> u64 {
        40 * 60
    }

    /// Slack added to the registry sweep's TTL check on top of the cleanup timer.
    pub fn cleanup_slack_secs(self) -> u64 {
        match self {
            RunKind::Letter => 2 * 60,
            RunKind::Research => 5 * 60,
        }
    }

    /// `RunStateStore` TTL safety budget: "stream-inactivity-budget + safety",
    /// distinct from (and larger than) the `StreamAdapter` inactivity timeout
    /// in `inactivity_budget_secs` — this is how long a store entry survives
    /// silence, not how long the live stream tolerates it.
    pub fn run_ttl_safety_secs(self) -> u64 {
        match self {
            RunKind::Letter => 7 * 60,
            RunKind::Research => 45 * 60,
        }
    }
}

/// Uniquely identifies one run: `{kind}:{userId}::{jobId}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunKey(String);

impl RunKey {
    pub fn new(kind: RunKind, user_id: &UserId, job_id: &JobId) -> Self {
        Self(format!("{kind}:{user_id}::{job_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Coarse run lifecycle status, monotonic: `Running -> {Completed, Error, Cancelled}` (invariant 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Error,
    Cancelled,
}

impl RunStatus {
    /// Whether this status is one of the terminal states.
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

crate::simple_display! {
    RunStatus {
        Running => "running",
        Completed => "completed",
        Error => "error",
        Cancelled => "cancelled",
    }
}

/// Free-form metadata carried alongside a [`RunState`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMeta {
    pub charged: bool,
    pub remaining_credits: Option<f64>,
    pub tone: Option<String>,
}

/// The persisted record backing one run, as described in and owned by
/// `RunStateStore`. Cheap to clone; every mutation goes through
/// `RunStateStore::update`/`heartbeat` rather than direct field assignment so
/// that TTL refresh and `responseId` immutability (invariant 2) stay enforced
/// in one place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub kind: RunKind,
    pub run_key: RunKey,
    pub user_id: UserId,
    pub job_id: JobId,
    pub instance_id: String,
    pub status: RunStatus,
    pub started_at_ms: u64,
    pub last_heartbeat_ms: u64,
    pub response_id: Option<String>,
    pub meta: RunMeta,
    pub ttl_secs: u64,
}

impl RunState {
    pub fn new(
        kind: RunKind,
        user_id: UserId,
        job_id: JobId,
        instance_id: impl Into<String>,
        now_ms: u64,
    ) -> Self {
        let run_key = RunKey::new(kind, &user_id, &job_id);
        Self {
            kind,
            run_key,
            user_id,
            job_id,
            instance_id: instance_id.into(),
            status: RunStatus::Running,
            started_at_ms: now_ms,
            last_heartbeat_ms: now_ms,
            response_id: None,
            meta: RunMeta::default(),
            ttl_secs: kind.run_ttl_safety_secs(),
        }
    }

    /// Whether `last_heartbeat_ms` is older than `threshold_secs` as of `now_ms` (orphan detection).
    pub fn is_stale(&self, now_ms: u64, threshold_secs: u64) -> bool {
        now_ms.saturating_sub(self.last_heartbeat_ms) > threshold_secs * 1_000
    }
}

/// State a resumed [`RunState`] is seeded from when `RunRegistry::begin` picks
/// up a run left behind by a prior process.
#[derive(Debug, Clone, Default)]
pub struct ResumeFromState {
    pub response_id: Option<String>,
    pub charged: bool,
    pub remaining_credits: Option<f64>,
}

/// A stable, tone-like free-form map handed through to the model client for
/// request extras the orchestrator does not itself interpret.
pub type RequestExtras = HashMap<String, String>;

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
