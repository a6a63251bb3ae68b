// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::protocol::RunSummary;
use oj_core::{RunKind, RunStatus};

fn sample_summary() -> RunSummary {
    RunSummary {
        run_key: "letter:usr-1::job-1".to_string(),
        kind: RunKind::Letter,
        user_id: "usr-1".to_string(),
        job_id: "job-1".to_string(),
        status: RunStatus::Running,
        charged: true,
        remaining_credits: Some(0.8),
        response_id: None,
    }
}

#[tokio::test]
async fn request_round_trips_over_a_pipe() {
    let (mut client, mut server) = tokio::io::duplex(4096);
    let request = Request::GetRun { run_key: "letter:usr-1::job-1".to_string() };
    write_request(&mut client, &request).await.unwrap();
    let decoded = read_request(&mut server).await.unwrap().unwrap();
    assert_eq!(decoded, request);
}

#[tokio::test]
async fn response_round_trips_over_a_pipe() {
    let (mut client, mut server) = tokio::io::duplex(4096);
    let response = Response::Runs { runs: vec![sample_summary()] };
    write_response(&mut server, &response).await.unwrap();
    let decoded = read_response(&mut client).await.unwrap().unwrap();
    assert_eq!(decoded, response);
}

#[tokio::test]
async fn eof_before_any_frame_yields_none() {
    let (client, mut server) = tokio::io::duplex(4096);
    drop(client);
    let decoded: Option<Request> = read_request(&mut server).await.unwrap();
    assert!(decoded.is_none());
}

#[tokio::test]
async fn oversized_frame_is_rejected() {
    let (mut client, mut server) = tokio::io::duplex(16);
    let huge_len = (MAX_FRAME_BYTES as u32) + 1;
    let write = client.write_all(&huge_len.to_be_bytes());
    tokio::spawn(async move {
            let _ = write.await;
    });
    let result: Result<Option<Request>, _> = read_request(&mut server).await;
    assert!(matches!(result, Err(ProtocolError::TooLarge(_))));
}
