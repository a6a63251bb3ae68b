// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Length-prefixed JSON framing for the operator socket: a 4-byte
//! big-endian length prefix followed by the JSON payload.

use crate::protocol::{ProtocolError, Request, Response, MAX_FRAME_BYTES};
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

async fn write_message<W: AsyncWrite + Unpin, T: Serialize>(
    writer: &mut W,
    message: &T,
) -> Result<(), ProtocolError> {
    let body = serde_json::to_vec(message)?;
    if body.len() > MAX_FRAME_BYTES {
        return Err(ProtocolError::TooLarge(body.len()));
    }
    writer.write_all(&(body.len() as u32).to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

async fn read_message<R: AsyncRead + Unpin, T: DeserializeOwned>(
    reader: &mut R,
) -> Result<Option<T>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(ProtocolError::TooLarge(len));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(serde_json::from_slice(&body)?))
}

pub async fn write_request<W: AsyncWrite + Unpin>(writer: &mut W, request: &Request) -> Result<(), ProtocolError> {
    write_message(writer, request).await
}

pub async fn read_request<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Request>, ProtocolError> {
    read_message(reader).await
}

pub async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &Response) -> Result<(), ProtocolError> {
    write_message(writer, response).await
}

pub async fn read_response<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Response>, ProtocolError> {
    read_message(reader).await
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
