// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory [`JobStore`] keyed by user id, for tests.

use super::JobStore;
use async_trait::async_trait;
use oj_core::{AdapterError, JobSnapshot, JobSnapshotPatch, UserId};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<UserId, JobSnapshot>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, user_id: UserId, snapshot: JobSnapshot) {
        self.jobs.lock().insert(user_id, snapshot);
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn get(&self, user_id: &UserId) -> Result<Option<JobSnapshot>, AdapterError> {
        Ok(self.jobs.lock().get(user_id).cloned())
    }

    async fn upsert(
        &self,
        user_id: &UserId,
        patch: JobSnapshotPatch,
    ) -> Result<JobSnapshot, AdapterError> {
        let mut jobs = self.jobs.lock();
        let snapshot = jobs
        .get_mut(user_id)
        .ok_or_else(|| AdapterError::NotFound(format!("no active job for {user_id}")))?;
        snapshot.apply_patch(patch);
        Ok(snapshot.clone())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
