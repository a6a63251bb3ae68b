// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `JobStore` — the caller-owned active job record. The
//! orchestrator only ever reads and writes the per-kind status/result
//! fields named on [`JobSnapshot`], and only through [`JobStore::upsert`],
//! which must merge against the latest read rather than clobber concurrent
//! caller edits.

use async_trait::async_trait;
use oj_core::{AdapterError, JobSnapshotPatch, UserId};
pub use oj_core::JobSnapshot;

#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    /// The user's single active job, or `None` if they have none.
    async fn get(&self, user_id: &UserId) -> Result<Option<JobSnapshot>, AdapterError>;

    /// Read-modify-write: re-reads the current snapshot and merges `patch`
    /// onto it before writing, so a concurrent caller edit to an unrelated
    /// field is never lost.
    async fn upsert(
        &self,
        user_id: &UserId,
        patch: JobSnapshotPatch,
    ) -> Result<JobSnapshot, AdapterError>;
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake;
