// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [`BackgroundPoller`] takes over once live streaming has given up but a
//! `responseId` is known. It repeatedly calls `ModelClient::retrieve`
//! until the provider reports a terminal state or the polling budget is
//! spent.

use oj_adapters::{ModelClient, ProviderResponseState};
use oj_core::AdapterError;
use std::time::Duration;
use tracing::warn;

/// How often `retrieve` is polled while waiting for a terminal state.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Outcome of a completed polling run.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// Provider reached a terminal state with content, if any.
    Completed { content: Option<String> },
    Failed,
    Cancelled,
    Incomplete,
    /// The budget expired before any terminal state was observed.
    TimedOut,
}

pub struct BackgroundPoller;

impl BackgroundPoller {
    /// Poll `client.retrieve(response_id)` every [`POLL_INTERVAL`] until a
    /// terminal state is observed or `budget` elapses. Transient fetch
    /// errors are logged and retried rather than failing the run outright
    ///.
    pub async fn run(
        client: &dyn ModelClient,
        response_id: &str,
        budget: Duration,
    ) -> PollOutcome {
        let deadline = tokio::time::Instant::now() + budget;
        loop {
            if tokio::time::Instant::now() >= deadline {
                return PollOutcome::TimedOut;
            }
            match client.retrieve(response_id).await {
                Ok(response) => match response.state {
                    ProviderResponseState::Completed => {
                        return PollOutcome::Completed { content: response.content }
                    }
                    // `null`/unknown is treated as an optimistic completion.
                    ProviderResponseState::Unknown => {
                        return PollOutcome::Completed { content: response.content }
                    }
                    ProviderResponseState::Failed => return PollOutcome::Failed,
                    ProviderResponseState::Cancelled => return PollOutcome::Cancelled,
                    ProviderResponseState::Incomplete => return PollOutcome::Incomplete,
                },
                Err(err) => log_transient(response_id, &err),
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return PollOutcome::TimedOut;
            }
            tokio::time::sleep(POLL_INTERVAL.min(remaining)).await;
        }
    }
}

fn log_transient(response_id: &str, err: &AdapterError) {
    warn!(response_id, error = %err, "transient error polling for terminal state, retrying");
}

#[cfg(test)]
#[path = "background_poller_tests.rs"]
mod tests;
