// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot client for the operator socket `ojd` serves: connect, send a
//! single [`Request`], read the matching [`Response`], close. There is no
//! persistent session to manage — every `oj runs...` invocation is a fresh
//! connection; this command surface is small enough that pooling a
//! connection across calls would buy nothing.

use std::path::{Path, PathBuf};

use oj_daemon::protocol::{Request, Response};
use oj_daemon::wire::{read_response, write_request};
use oj_daemon::Config;
use tokio::net::UnixStream;

use crate::exit_error::ExitError;

/// Resolves the operator socket path the same way `ojd` does (`OJ_SOCKET_PATH`,
/// falling back to `$TMPDIR/ojd.sock`), so `oj` talks to the instance a
/// plain `ojd` invocation started without extra flags.
pub fn socket_path() -> PathBuf {
    Config::from_env().socket_path
}

/// Sends `request` to the daemon listening at `path` and returns its response.
pub async fn call(path: &Path, request: Request) -> anyhow::Result<Response> {
    let mut stream = UnixStream::connect(path).await.map_err(|err| {
            ExitError::new(
                69, // EX_UNAVAILABLE
                format!(
                    "could not reach ojd at {} ({err}). Is the daemon running?",
                    path.display()
                ),
            )
    })?;
    write_request(&mut stream, &request).await?;
    read_response(&mut stream)
    .await?
    .ok_or_else(|| ExitError::new(1, "ojd closed the connection without responding").into())
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
