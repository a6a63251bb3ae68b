// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The [`RunStateStore`] trait and an in-memory reference implementation.
//! A production deployment backs this with a shared store (Redis, a KV
//! table,...) reachable from every instance; the in-memory version here is
//! what `oj-engine`'s and `oj-daemon`'s test suites run against, and it
//! implements the same TTL and orphan semantics a real backend must.

use async_trait::async_trait;
use oj_core::{RunKey, RunState, RunStatus};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Default orphan threshold: a `running` entry whose heartbeat is
/// older than this is no longer trusted to have a live owner.
pub const DEFAULT_ORPHAN_THRESHOLD_SECS: u64 = 120;

#[derive(Debug, Error)]
pub enum RunStoreError {
    #[error("a run is already active for this key")]
    AlreadyActive,
    #[error("no entry for this run key")]
    NotFound,
}

/// A sparse, atomic patch to an existing [`RunState`] (`Update`).
/// `response_id` is accepted but never overwrites an already-set value
/// (invariant 2: once non-null, `responseId` is immutable) — callers that
/// already know the response id should simply stop passing it.
#[derive(Debug, Clone, Default)]
pub struct RunStatePatch {
    pub status: Option<RunStatus>,
    pub response_id: Option<String>,
    pub charged: Option<bool>,
    pub remaining_credits: Option<f64>,
    pub tone: Option<String>,
}

impl RunStatePatch {
    pub fn status(status: RunStatus) -> Self {
        Self { status: Some(status),..Default::default() }
    }

    pub fn response_id(response_id: impl Into<String>) -> Self {
        Self { response_id: Some(response_id.into()),..Default::default() }
    }
}

/// Distributed registry of active runs, keyed by `(kind, userId, jobId)`
///. Every write refreshes TTL; a read that finds an expired entry
/// behaves as though it were absent, mirroring a real backend's expiry.
#[async_trait]
pub trait RunStateStore: Send + Sync + 'static {
    /// Idempotent create-or-replace. Fails with [`RunStoreError::AlreadyActive`]
    /// if a `running` entry already exists whose heartbeat is within the
    /// orphan threshold.
    async fn register(&self, state: RunState) -> Result<(), RunStoreError>;

    /// Atomic merge of status/responseId/meta. Refreshes TTL. Fails with
    /// [`RunStoreError::NotFound`] if the key isn't registered (or has
    /// expired).
    async fn update(&self, run_key: &RunKey, patch: RunStatePatch) -> Result<RunState, RunStoreError>;

    /// Cheap refresh-only path; callers MUST invoke at least once per second
    /// while a run is producing events or blocked waiting.
    async fn heartbeat(&self, run_key: &RunKey, patch: Option<RunStatePatch>) -> Result<(), RunStoreError>;

    async fn get(&self, run_key: &RunKey) -> Option<RunState>;

    async fn remove(&self, run_key: &RunKey);

    /// All live (non-expired) entries; used by startup recovery and
    /// graceful shutdown.
    async fn list_all(&self) -> Vec<RunState>;

    /// Entries with `status == running` and a heartbeat older than
    /// `threshold_secs`.
    async fn list_stale(&self, threshold_secs: u64) -> Vec<RunState>;
}

/// In-memory [`RunStateStore`]. Single-process only: in a real horizontally
/// scaled deployment this would be backed by a shared store, but the
/// contract (TTL expiry, orphan detection, responseId immutability) is the
/// same either way.
pub struct InMemoryRunStateStore<C: oj_core::Clock> {
    entries: parking_lot::Mutex<HashMap<RunKey, RunState>>,
    clock: C,
}

impl<C: oj_core::Clock> InMemoryRunStateStore<C> {
    pub fn new(clock: C) -> Self {
        Self { entries: parking_lot::Mutex::new(HashMap::new()), clock }
    }

    pub fn shared(clock: C) -> Arc<Self> {
        Arc::new(Self::new(clock))
    }

    fn is_expired(&self, state: &RunState, now_ms: u64) -> bool {
        now_ms.saturating_sub(state.last_heartbeat_ms) > state.ttl_secs * 1_000
    }

    fn apply_patch(state: &mut RunState, patch: RunStatePatch, now_ms: u64) {
        if let Some(status) = patch.status {
            state.status = status;
        }
        if let Some(response_id) = patch.response_id {
            // Invariant 2: responseId, once non-null, is never mutated.
            if state.response_id.is_none() {
                state.response_id = Some(response_id);
            }
        }
        if let Some(charged) = patch.charged {
            // charged is never cleared by a patch; only set true.
            state.meta.charged = state.meta.charged || charged;
        }
        if let Some(remaining) = patch.remaining_credits {
            state.meta.remaining_credits = Some(remaining);
        }
        if let Some(tone) = patch.tone {
            state.meta.tone = Some(tone);
        }
        state.last_heartbeat_ms = now_ms;
    }
}

#[async_trait]
impl<C: oj_core::Clock> RunStateStore for InMemoryRunStateStore<C> {
    async fn register(&self, state: RunState) -> Result<(), RunStoreError> {
        let now_ms = self.clock.epoch_ms();
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&state.run_key) {
            if existing.status == RunStatus::Running
            && !self.is_expired(existing, now_ms)
            && !existing.is_stale(now_ms, DEFAULT_ORPHAN_THRESHOLD_SECS)
            {
                return Err(RunStoreError::AlreadyActive);
            }
        }
        entries.insert(state.run_key.clone(), state);
        Ok(())
    }

    async fn update(&self, run_key: &RunKey, patch: RunStatePatch) -> Result<RunState, RunStoreError> {
        let now_ms = self.clock.epoch_ms();
        let mut entries = self.entries.lock();
        let state = entries.get_mut(run_key).ok_or(RunStoreError::NotFound)?;
        if self.is_expired(state, now_ms) {
            entries.remove(run_key);
            return Err(RunStoreError::NotFound);
        }
        Self::apply_patch(state, patch, now_ms);
        Ok(state.clone())
    }

    async fn heartbeat(&self, run_key: &RunKey, patch: Option<RunStatePatch>) -> Result<(), RunStoreError> {
        self.update(run_key, patch.unwrap_or_default()).await.map(|_| ())
    }

    async fn get(&self, run_key: &RunKey) -> Option<RunState> {
        let now_ms = self.clock.epoch_ms();
        let mut entries = self.entries.lock();
        match entries.get(run_key) {
            Some(state) if !self.is_expired(state, now_ms) => Some(state.clone()),
            Some(_) => {
                entries.remove(run_key);
                None
            }
            None => None,
        }
    }

    async fn remove(&self, run_key: &RunKey) {
        self.entries.lock().remove(run_key);
    }

    async fn list_all(&self) -> Vec<RunState> {
        let now_ms = self.clock.epoch_ms();
        let mut entries = self.entries.lock();
        let expired: Vec<RunKey> = entries
        .iter()
        .filter(|(_, s)| self.is_expired(s, now_ms))
        .map(|(k, _)| k.clone())
        .collect();
        for key in expired {
            entries.remove(&key);
        }
        entries.values().cloned().collect()
    }

    async fn list_stale(&self, threshold_secs: u64) -> Vec<RunState> {
        let now_ms = self.clock.epoch_ms();
        self.entries
        .lock()
        .values()
        .filter(|s| s.status == RunStatus::Running && s.is_stale(now_ms, threshold_secs))
        .cloned()
        .collect()
    }
}

#[cfg(test)]
#[path = "run_state_store_tests.rs"]
mod tests;
