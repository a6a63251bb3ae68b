// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator socket: accepts connections from `oj` and dispatches
//! `protocol::Request`s against the live `RunRegistry`. A single Unix
//! socket with no auth handshake — there's no multi-tenant transport to
//! protect here, since auth and transport sit outside this orchestrator's
//! boundary.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use oj_core::Clock;
use oj_storage::RunStateStore;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::{run_key_matches, ProtocolError, Request, Response, RunSummary};
use crate::wire::{read_request, write_response};
use oj_engine::RunRegistry;

/// Shared handles every operator request is dispatched against.
#[derive(Clone)]
struct Ctx<C: Clock + 'static> {
    registry: Arc<RunRegistry<C>>,
    store: Arc<dyn RunStateStore>,
}

/// Listener task for the operator socket.
pub struct Listener<C: Clock + 'static> {
    unix: UnixListener,
    socket_path: PathBuf,
    ctx: Ctx<C>,
}

impl<C: Clock + 'static> Listener<C> {
    pub fn bind(
        socket_path: impl AsRef<Path>,
        registry: Arc<RunRegistry<C>>,
        store: Arc<dyn RunStateStore>,
    ) -> std::io::Result<Self> {
        let socket_path = socket_path.as_ref().to_path_buf();
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)?;
        }
        let unix = UnixListener::bind(&socket_path)?;
        Ok(Self { unix, socket_path, ctx: Ctx { registry, store } })
    }

    /// Accept connections until `shutdown` fires, handling each on its own
    /// task. Returns once the listener stops accepting.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(path = %self.socket_path.display(), "operator socket listening");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("operator socket shutting down");
                    break;
                }
                accepted = self.unix.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => {
                            let ctx = self.ctx.clone();
                            tokio::spawn(async move {
                                    if let Err(err) = handle_connection(stream, ctx).await {
                                        warn!(error = %err, "operator connection ended with an error");
                                    }
                            });
                        }
                        Err(err) => warn!(error = %err, "failed to accept operator connection"),
                    }
                }
            }
        }
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

async fn handle_connection<C: Clock + 'static>(mut stream: UnixStream, ctx: Ctx<C>) -> Result<(), ProtocolError> {
    loop {
        let Some(request) = read_request(&mut stream).await? else {
            return Ok(());
        };
        debug!(?request, "operator request");
        let response = dispatch(&ctx, request).await;
        write_response(&mut stream, &response).await?;
    }
}

async fn dispatch<C: Clock + 'static>(ctx: &Ctx<C>, request: Request) -> Response {
    match request {
        Request::Ping => Response::Pong,
        Request::ListRuns => {
            let mut runs = Vec::new();
            for key in ctx.registry.list_run_keys() {
                if let Some(state) = ctx.store.get(&key).await {
                    runs.push(RunSummary::from_state(&state));
                }
            }
            Response::Runs { runs }
        }
        Request::GetRun { run_key } => {
            let found = find_key(ctx, &run_key).await;
            let run = match found {
                Some(key) => ctx.store.get(&key).await.as_ref().map(RunSummary::from_state),
                None => None,
            };
            Response::Run { run }
        }
        Request::CancelRun { run_key } => match find_key(ctx, &run_key).await.and_then(|key| ctx.registry.get(&key)) {
            Some(executor) => {
                executor.cancel();
                Response::Cancelled
            }
            None => Response::Error { message: format!("no live run for key {run_key}") },
        },
    }
}

async fn find_key<C: Clock + 'static>(ctx: &Ctx<C>, run_key: &str) -> Option<oj_core::RunKey> {
    ctx.registry.list_run_keys().into_iter().find(|key| run_key_matches(key, run_key))
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
