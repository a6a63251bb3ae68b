// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! oj-daemon: the `ojd` process that hosts a `RunRegistry` for one
//! instance, recovers runs at startup, sweeps terminal entries, and serves
//! the small operator protocol defined in [`protocol`] over a Unix socket.
//! Everything orchestration-shaped lives in `oj-engine`; this crate is
//! purely the long-running-process wrapper around it.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod lifecycle;
pub mod listener;
pub mod protocol;
pub mod wire;

pub use config::Config;
pub use lifecycle::{recover_on_startup, RecoverySummary, Shutdown};
pub use listener::Listener;
pub use protocol::{run_key_matches, ProtocolError, Request, Response, RunSummary};
