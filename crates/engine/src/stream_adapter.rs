// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [`StreamAdapter`] wraps a provider event stream with an inactivity
//! timeout, cancellation, and controller-abort. It does not
//! interpret events; it only gates their flow on liveness.

use oj_adapters::EventStream;
use oj_core::{AdapterError, ProviderEvent, RunKind};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum StreamAdapterError {
    #[error("no provider event within the inactivity budget")]
    TimeoutExceeded,
    #[error("stream cancelled")]
    Cancelled,
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

/// Wraps one provider [`EventStream`]. Each call to [`StreamAdapter::next`]
/// either returns the next event, aborts with [`StreamAdapterError::TimeoutExceeded`]
/// after `inactivity_budget` with no event, or ends if the caller has
/// cancelled the adapter's controller.
pub struct StreamAdapter {
    inner: EventStream,
    inactivity_budget: Duration,
    cancel_token: CancellationToken,
}

impl StreamAdapter {
    pub fn new(inner: EventStream, inactivity_budget: Duration) -> Self {
        Self { inner, inactivity_budget, cancel_token: CancellationToken::new() }
    }

    /// Convenience constructor using the per-kind budget from.
    pub fn for_kind(inner: EventStream, kind: RunKind) -> Self {
        Self::new(inner, Duration::from_secs(kind.inactivity_budget_secs()))
    }

    /// A handle the caller can use to abort the underlying controller from
    /// elsewhere (e.g. an operator `Cancel` request, ).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub async fn next(&mut self) -> Option<Result<ProviderEvent, StreamAdapterError>> {
        use futures_util::StreamExt;

        if self.cancel_token.is_cancelled() {
            return Some(Err(StreamAdapterError::Cancelled));
        }

        tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => Some(Err(StreamAdapterError::Cancelled)),
            timed = tokio::time::timeout(self.inactivity_budget, self.inner.next()) => {
                match timed {
                    Ok(Some(Ok(event))) => Some(Ok(event)),
                    Ok(Some(Err(err))) => Some(Err(StreamAdapterError::Adapter(err))),
                    Ok(None) => None,
                    Err(_elapsed) => {
                        // Inactivity timeout: abort the controller so the
                        // underlying connection doesn't linger.
                        self.cancel_token.cancel();
                        Some(Err(StreamAdapterError::TimeoutExceeded))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "stream_adapter_tests.rs"]
mod tests;
