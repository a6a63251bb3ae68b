// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [`EventBuffer`] — a bounded, replay-capable, single-producer/
//! multi-consumer channel. A late subscriber receives everything
//! published so far, in order, followed by subsequent live events, ending
//! when a terminal payload is observed or the buffer is closed.

use oj_core::StreamPayload;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

/// Capacity beyond which the oldest buffered item is dropped. Never
/// applies once a terminal payload has been published — nothing is
/// published after it anyway, since `publish` ignores calls once terminal.
pub const CAPACITY: usize = 2000;

struct State {
    items: VecDeque<StreamPayload>,
    /// Global index of `items[0]`; items before this have been dropped.
    start_index: u64,
    terminal: bool,
    closed: bool,
}

struct Inner {
    state: Mutex<State>,
    notify: Notify,
}

/// The producer side, owned exclusively by one `RunExecutor` task.
#[derive(Clone)]
pub struct EventBuffer {
    inner: Arc<Inner>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                    state: Mutex::new(State {
                            items: VecDeque::new(),
                            start_index: 0,
                            terminal: false,
                            closed: false,
                    }),
                    notify: Notify::new(),
            }),
        }
    }

    /// Non-blocking publish from the producer. Ignored once a terminal
    /// payload has already been published (contract).
    pub fn publish(&self, payload: StreamPayload) {
        let mut state = self.inner.state.lock();
        if state.terminal {
            return;
        }
        let is_terminal = payload.is_terminal();
        state.items.push_back(payload);
        if state.items.len() > CAPACITY {
            state.items.pop_front();
            state.start_index += 1;
        }
        if is_terminal {
            state.terminal = true;
        }
        drop(state);
        self.inner.notify.notify_waiters();
    }

    /// Sent automatically after a terminal payload, but also callable
    /// directly (e.g. on process shutdown) to end subscriptions without a
    /// terminal payload.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        state.closed = true;
        drop(state);
        self.inner.notify.notify_waiters();
    }

    pub fn is_terminal(&self) -> bool {
        self.inner.state.lock().terminal
    }

    /// Returns an iterator over all buffered payloads followed by new ones.
    pub fn subscribe(&self) -> Subscription {
        Subscription { inner: self.inner.clone(), cursor: 0 }
    }
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscriber's view of an [`EventBuffer`]. Cheap to create; many can
/// coexist over the same buffer.
pub struct Subscription {
    inner: Arc<Inner>,
    cursor: u64,
}

impl Subscription {
    /// Yields the next payload, or `None` once terminal/closed and fully
    /// drained.
    pub async fn next(&mut self) -> Option<StreamPayload> {
        loop {
            let notified = {
                let state = self.inner.state.lock();
                // A late subscriber whose cursor predates the window of
                // items still buffered jumps forward; earlier items were
                // dropped under capacity pressure and can never be replayed.
                if self.cursor < state.start_index {
                    self.cursor = state.start_index;
                }
                let local_idx = (self.cursor - state.start_index) as usize;
                if let Some(item) = state.items.get(local_idx).cloned() {
                    drop(state);
                    self.cursor += 1;
                    return Some(item);
                }
                if state.terminal || state.closed {
                    return None;
                }
                // Register interest before releasing the lock so a publish
                // that lands between here and `.await` below isn't missed.
                self.inner.notify.notified()
            };
            notified.await;
        }
    }
}

#[cfg(test)]
#[path = "event_buffer_tests.rs"]
mod tests;
