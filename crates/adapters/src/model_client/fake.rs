// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory [`ModelClient`] for tests: replays a scripted sequence of
//! events/failures so `ResumePolicy`/`RunExecutor` tests can exercise
//! transport blips and resumes deterministically.

use super::{EventStream, ModelClient, ProviderResponse, ProviderResponseState, StreamRequest};
use async_trait::async_trait;
use futures_util::stream;
use oj_core::{AdapterError, ProviderEvent, RequestExtras};
use parking_lot::Mutex;
use std::sync::Arc;

/// One scripted outcome: either a provider event, a stream failure, or an
/// indefinite stall (used to exercise inactivity timeouts and operator
/// cancellation, which both need a stream that never resolves on its own).
#[derive(Debug, Clone)]
pub enum FakeStep {
    Event(ProviderEvent),
    Fail(String),
    Pending,
}

#[derive(Default)]
struct Calls {
    create_stream: u32,
    resume_stream: u32,
    retrieve: u32,
}

/// Configurable fake. `script` is consumed in order by `create_stream`; a
/// `resume_stream` call replays whatever portion of the script has a
/// `sequence_number` greater than the caller's cursor.
pub struct FakeModelClient {
    script: Arc<Mutex<Vec<FakeStep>>>,
    retrieve_result: Arc<Mutex<Option<ProviderResponse>>>,
    calls: Arc<Mutex<Calls>>,
}

impl FakeModelClient {
    pub fn new(script: Vec<FakeStep>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script)),
            retrieve_result: Arc::new(Mutex::new(None)),
            calls: Arc::new(Mutex::new(Calls::default())),
        }
    }

    pub fn set_retrieve_result(&self, response: ProviderResponse) {
        *self.retrieve_result.lock() = Some(response);
    }

    pub fn create_stream_calls(&self) -> u32 {
        self.calls.lock().create_stream
    }

    pub fn resume_stream_calls(&self) -> u32 {
        self.calls.lock().resume_stream
    }

    fn stream_from(&self, steps: Vec<FakeStep>) -> EventStream {
        let stalls = steps.iter().any(|s| matches!(s, FakeStep::Pending));
        let finite = stream::iter(steps.into_iter().filter_map(|step| match step {
                    FakeStep::Event(event) => Some(Ok(event)),
                    FakeStep::Fail(message) => Some(Err(AdapterError::Transport(message))),
                    FakeStep::Pending => None,
        }));
        if stalls {
            Box::pin(finite.chain(stream::pending()))
        } else {
            Box::pin(finite)
        }
    }
}

#[async_trait]
impl ModelClient for FakeModelClient {
    async fn create_stream(&self, _request: StreamRequest) -> Result<EventStream, AdapterError> {
        self.calls.lock().create_stream += 1;
        let steps = self.script.lock().clone();
        Ok(self.stream_from(steps))
    }

    async fn resume_stream(
        &self,
        _response_id: &str,
        cursor: Option<&str>,
        sequence_number: Option<u64>,
        _extras: &RequestExtras,
    ) -> Result<EventStream, AdapterError> {
        self.calls.lock().resume_stream += 1;
        let script = self.script.lock().clone();
        let remaining: Vec<FakeStep> = script
        .into_iter()
        .filter(|step| match step {
                FakeStep::Event(event) => {
                    if let (Some(cursor), Some(event_cursor)) = (cursor, event.cursor.as_deref()) {
                        event_cursor > cursor
                    } else if let (Some(seq), Some(event_seq)) = (sequence_number, event.sequence_number)
                    {
                        event_seq > seq
                    } else {
                        true
                    }
                }
                FakeStep::Fail(_) => true,
                FakeStep::Pending => true,
        })
        .collect();
        Ok(self.stream_from(remaining))
    }

    async fn retrieve(&self, _response_id: &str) -> Result<ProviderResponse, AdapterError> {
        self.calls.lock().retrieve += 1;
        Ok(self.retrieve_result.lock().clone().unwrap_or(ProviderResponse {
                    state: ProviderResponseState::Unknown,
                    content: None,
        }))
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
