// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration. Every numeric knob the
//! orchestrator itself enforces (TTLs, budgets, backoff caps) is a
//! spec-fixed constant colocated with the component that owns it — see
//! `oj_core::run::RunKind`, `oj_engine::resume_policy::MAX_ATTEMPTS`,
//! `oj_engine::event_buffer::CAPACITY`. What a deployed instance of this
//! daemon still needs from its environment is process identity and the
//! cadence of its own housekeeping loops, which this `Config` covers.

use std::path::PathBuf;
use std::time::Duration;

fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    std::env::var(key)
    .ok()
    .and_then(|v| v.parse::<u64>().ok())
    .map(Duration::from_secs)
    .unwrap_or_else(|| Duration::from_secs(default_secs))
}

/// Runtime configuration for one `ojd` process, built from environment
/// variables with documented defaults rather than a config file (every spec
/// constant is fixed; nothing here changes orchestrator semantics).
#[derive(Debug, Clone)]
pub struct Config {
    /// Opaque identifier of this process, stamped onto every `RunState` it
    /// writes (`instanceId`). Defaults to `ojd-<pid>` when unset, which is
    /// unique enough for the single-host deployments this crate targets.
    pub instance_id: String,
    /// How often `RunRegistry::sweep` runs to clear terminal entries past
    /// their TTL + slack.
    pub sweep_interval: Duration,
    /// Bounded grace period graceful shutdown waits for in-flight executors
    /// to reach a terminal status before abandoning stragglers.
    pub shutdown_grace: Duration,
    /// Path of the Unix socket the operator surface listens on. Defaults to
    /// `$TMPDIR/ojd.sock`.
    pub socket_path: PathBuf,
}

impl Config {
    /// `OJ_INSTANCE_ID`, `OJ_SWEEP_INTERVAL_SECS` (default 600, every 10
    /// min), `OJ_SHUTDOWN_GRACE_SECS` (default 30),
    /// `OJ_SOCKET_PATH` (default `$TMPDIR/ojd.sock`).
    pub fn from_env() -> Self {
        let instance_id = std::env::var("OJ_INSTANCE_ID")
        .unwrap_or_else(|_| format!("ojd-{}", std::process::id()));
        let socket_path = std::env::var("OJ_SOCKET_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir().join("ojd.sock"));
        Self {
            instance_id,
            sweep_interval: env_duration_secs("OJ_SWEEP_INTERVAL_SECS", 10 * 60),
            shutdown_grace: env_duration_secs("OJ_SHUTDOWN_GRACE_SECS", 30),
            socket_path,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
