// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup recovery and graceful shutdown: recovery walks persisted
//! state at boot and either resumes or orphans what it finds; shutdown
//! cancels every live executor and waits a bounded grace period before
//! abandoning stragglers.

use std::sync::Arc;
use std::time::Duration;

use oj_core::{Clock, RunStatus};
use oj_engine::{BeginOptions, RunRegistry};
use oj_storage::RunStateStore;
use tracing::{info, warn};

/// On process start, resume or orphan every `RunStateStore` entry this
/// instance doesn't already have a live in-process executor for.
/// `RunRegistry::begin` already implements the resume-vs-orphan decision
/// (seed from `responseId` if known, else refund-if-charged and clear) —
/// this routine just gives that decision a named entry point exercised at
/// boot.
pub async fn recover_on_startup<C: Clock + 'static>(
    registry: &Arc<RunRegistry<C>>,
    store: &Arc<dyn RunStateStore>,
) -> RecoverySummary {
    let mut summary = RecoverySummary::default();
    for state in store.list_all().await {
        if state.status != RunStatus::Running {
            continue;
        }
        if registry.get(&state.run_key).is_some() {
            // Already owned by a live executor in this process.
            continue;
        }

        let tone = state.meta.tone.as_deref().and_then(|t| t.parse().ok());
        let opts = BeginOptions { restart: false, create_if_missing: true, tone,..Default::default() };
        match registry
        .begin(state.user_id.clone(), state.kind, Some(state.job_id.clone()), opts)
        .await
        {
            Ok(_) => {
                info!(run_key = %state.run_key, "recovered run at startup");
                summary.recovered += 1;
            }
            Err(err) => {
                warn!(run_key = %state.run_key, error = %err, "failed to recover run at startup");
                summary.failed += 1;
            }
        }
    }
    summary
}

/// Outcome of one `recover_on_startup` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoverySummary {
    pub recovered: u32,
    pub failed: u32,
}

/// Coordinates graceful shutdown of every run this process owns. On
/// `shutdown`, every live executor is told to cancel without a refund (the
/// run may still complete on a peer instance after resume), then this waits
/// up to `grace` for them to reach a terminal status before abandoning the
/// rest — logged, not panicked.
pub struct Shutdown<C: Clock + 'static> {
    registry: Arc<RunRegistry<C>>,
}

impl<C: Clock + 'static> Shutdown<C> {
    pub fn new(registry: Arc<RunRegistry<C>>) -> Self {
        Self { registry }
    }

    pub async fn run(&self, grace: Duration) {
        info!("graceful shutdown: cancelling live runs");
        self.registry.shutdown().await;

        let deadline = tokio::time::Instant::now() + grace;
        loop {
            let still_running = self.registry.running_count();
            if still_running == 0 {
                info!("graceful shutdown: all runs reached a terminal status");
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(still_running, "graceful shutdown: grace period elapsed, abandoning stragglers");
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
