// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `oj`: the operator CLI for `ojd`. A thin wrapper around the IPC protocol
//! in `oj_daemon::protocol` — every subcommand opens one connection, sends
//! one request, prints the response, and exits. There is no session state
//! to hold between invocations; this orchestrator has nothing else for an
//! operator to reach for beyond listing, inspecting, and cancelling runs
//! (`Cancel(runKey)`).

mod client;
mod exit_error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use exit_error::ExitError;
use oj_daemon::protocol::{Request, Response, RunSummary};

#[derive(Parser)]
#[command(name = "oj", version, about = "Operator CLI for ojd")]
struct Cli {
    /// Path to the ojd operator socket. Defaults to `$OJ_SOCKET_PATH`, then
    /// `$TMPDIR/ojd.sock` (the same resolution `ojd` itself uses).
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that ojd is reachable.
    Ping,
    /// Inspect and manage live runs.
    Runs {
        #[command(subcommand)]
        command: RunsCommand,
    },
}

#[derive(Subcommand)]
enum RunsCommand {
    /// List every run this ojd instance currently holds a live executor for.
    List,
    /// Show one run's current state.
    Show {
        /// Run key, as rendered by ojd: `{kind}:{userId}::{jobId}`.
        run_key: String,
    },
    /// Issue the explicit operator cancel.
    Cancel {
        /// Run key, as rendered by ojd: `{kind}:{userId}::{jobId}`.
        run_key: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let socket_path = cli.socket.unwrap_or_else(client::socket_path);

    match dispatch(&socket_path, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("oj: {err}");
            match err.downcast::<ExitError>() {
                Ok(exit_error) => ExitCode::from(exit_error.code as u8),
                Err(_) => ExitCode::FAILURE,
            }
        }
    }
}

async fn dispatch(socket_path: &std::path::Path, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Ping => {
            match client::call(socket_path, Request::Ping).await? {
                Response::Pong => println!("pong"),
                other => unexpected(other)?,
            }
            Ok(())
        }
        Command::Runs { command: RunsCommand::List } => {
            match client::call(socket_path, Request::ListRuns).await? {
                Response::Runs { runs } => print_runs(&runs),
                other => unexpected(other)?,
            }
            Ok(())
        }
        Command::Runs { command: RunsCommand::Show { run_key } } => {
            match client::call(socket_path, Request::GetRun { run_key: run_key.clone() }).await? {
                Response::Run { run: Some(run) } => print_run(&run),
                Response::Run { run: None } => {
                    return Err(ExitError::new(1, format!("no run found for key {run_key}")).into())
                }
                other => unexpected(other)?,
            }
            Ok(())
        }
        Command::Runs { command: RunsCommand::Cancel { run_key } } => {
            match client::call(socket_path, Request::CancelRun { run_key: run_key.clone() }).await? {
                Response::Cancelled => println!("cancelled {run_key}"),
                Response::Error { message } => return Err(ExitError::new(1, message).into()),
                other => unexpected(other)?,
            }
            Ok(())
        }
    }
}

fn unexpected(response: Response) -> anyhow::Result<()> {
    Err(ExitError::new(1, format!("unexpected response from ojd: {response:?}")).into())
}

fn print_runs(runs: &[RunSummary]) {
    if runs.is_empty() {
        println!("no live runs");
        return;
    }
    println!("{:<40} {:<9} {:<9} {:<12}", "RUN KEY", "KIND", "STATUS", "CREDITS");
    for run in runs {
        println!(
            "{:<40} {:<9} {:<9} {:<12}",
            run.run_key,
            run.kind,
            run.status,
            run.remaining_credits.map(|c| format!("{c:.2}")).unwrap_or_else(|| "-".to_string()),
        );
    }
}

fn print_run(run: &RunSummary) {
    println!("run_key: {}", run.run_key);
    println!("kind: {}", run.kind);
    println!("user_id: {}", run.user_id);
    println!("job_id: {}", run.job_id);
    println!("status: {}", run.status);
    println!("charged: {}", run.charged);
    println!(
        "remaining_credits: {}",
        run.remaining_credits.map(|c| format!("{c:.2}")).unwrap_or_else(|| "-".to_string())
    );
    println!("response_id: {}", run.response_id.as_deref().unwrap_or("-"));
}
