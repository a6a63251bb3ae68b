// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ojd`: the process that hosts one instance's `RunRegistry`,
//! recovers persisted runs at startup, serves the operator protocol over a
//! Unix socket, periodically sweeps terminal entries, and shuts down
//! gracefully on SIGINT/SIGTERM.
//!
//! This binary has no production `CreditLedger`/`JobStore`/`ModelClient`/
//! `ProfileLookup` backend to construct — those collaborators are out of
//! scope — so it wires the in-memory reference adapters from
//! `oj-adapters`'s `test-support` feature. A real deployment swaps this
//! wiring for crates implementing the same traits against its actual
//! provider and database.

use std::error::Error;
use std::sync::Arc;

use oj_adapters::{FakeModelClient, FakeProfileLookup, InMemoryCreditLedger, InMemoryJobStore};
use oj_core::SystemClock;
use oj_daemon::{recover_on_startup, Config, Listener, Shutdown};
use oj_engine::{Collaborators, RunRegistry};
use oj_storage::{InMemoryRunStateStore, RunStateStore};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

    let config = Config::from_env();
    info!(instance_id = %config.instance_id, socket = %config.socket_path.display(), "starting ojd");

    let clock = SystemClock;
    let run_state_store: Arc<dyn RunStateStore> = InMemoryRunStateStore::shared(clock.clone());
    let collaborators = Collaborators {
        credit_ledger: Arc::new(InMemoryCreditLedger::new()),
        job_store: Arc::new(InMemoryJobStore::new()),
        model_client: Arc::new(FakeModelClient::new(Vec::new())),
        profile_lookup: Arc::new(FakeProfileLookup::new()),
        run_state_store: run_state_store.clone(),
    };
    let registry = RunRegistry::new(collaborators, clock, config.instance_id.clone());

    let recovery = recover_on_startup(&registry, &run_state_store).await;
    info!(recovered = recovery.recovered, failed = recovery.failed, "startup recovery complete");

    let listener = Listener::bind(&config.socket_path, registry.clone(), run_state_store.clone())?;

    let shutdown = CancellationToken::new();
    let listener_task = tokio::spawn(listener.run(shutdown.clone()));

    let sweep_registry = registry.clone();
    let sweep_interval = config.sweep_interval;
    let sweep_shutdown = shutdown.clone();
    let sweep_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            loop {
                tokio::select! {
                    _ = sweep_shutdown.cancelled() => break,
                    _ = ticker.tick() => sweep_registry.sweep().await,
                }
            }
    });

    wait_for_shutdown_signal().await?;
    info!("signal received, shutting down");
    shutdown.cancel();

    Shutdown::new(registry.clone()).run(config.shutdown_grace).await;

    let _ = listener_task.await;
    let _ = sweep_task.await;
    Ok(())
}

/// Waits for SIGTERM or SIGINT, whichever arrives first.
async fn wait_for_shutdown_signal() -> Result<(), Box<dyn Error>> {
    let mut sigterm = signal(SignalKind::terminate)?;
    let mut sigint = signal(SignalKind::interrupt)?;
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
    Ok(())
}
