// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ModelClient` abstracts the remote reasoning provider the orchestrator
//! streams from. Mirrors the shape of `AgentAdapter`: a spawn/send/
//! reconnect-style trait with an async-trait boundary, so `RunExecutor`
//! never sees provider wire detail.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use oj_core::{AdapterError, ProviderEvent, RequestExtras, RunKind};

/// A single provider call's request parameters.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub kind: RunKind,
    pub model: String,
    pub input: String,
    pub extras: RequestExtras,
}

/// A stream of provider events, boxed so different backends (HTTP/SSE,
/// websocket, in-memory fake) can share one trait object.
pub type EventStream = BoxStream<'static, Result<ProviderEvent, AdapterError>>;

/// Terminal state of a previously-created response, as returned by
/// `retrieve` when background polling takes over from live streaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderResponseState {
    Completed,
    Failed,
    Cancelled,
    Incomplete,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub state: ProviderResponseState,
    pub content: Option<String>,
}

#[async_trait]
pub trait ModelClient: Send + Sync + 'static {
    /// Start a brand new stream for `request`.
    async fn create_stream(&self, request: StreamRequest) -> Result<EventStream, AdapterError>;

    /// Resume an existing response from `cursor` (event id) or, if `cursor`
    /// is `None`, from `sequence_number`.
    async fn resume_stream(
        &self,
        response_id: &str,
        cursor: Option<&str>,
        sequence_number: Option<u64>,
        extras: &RequestExtras,
    ) -> Result<EventStream, AdapterError>;

    /// Fetch the stored terminal state of a response (background polling, ).
    async fn retrieve(&self, response_id: &str) -> Result<ProviderResponse, AdapterError>;
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

#[cfg(test)]
#[path = "model_client_tests.rs"]
mod tests;
