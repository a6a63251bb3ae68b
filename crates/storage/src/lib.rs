// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! oj-storage: `RunStateStore` — the distributed, TTL'd registry of
//! active runs that lets a run resume across process restarts and across
//! horizontally-scaled instances. Treated as advisory, not authoritative
//!: the in-process `RunRegistry` always wins a discrepancy, and a
//! stale entry is resolved by orphan handling rather than trusted blindly.

pub mod run_state_store;

pub use run_state_store::{
    InMemoryRunStateStore, RunStatePatch, RunStateStore, RunStoreError, DEFAULT_ORPHAN_THRESHOLD_SECS,
};
