// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control protocol: line-oriented commands over TCP.
//!
//! One connection carries one command and one response. The client sends
//! a single UTF-8 command line (at most 1024 bytes); the server answers
//! with a status line (`OK` or `ERROR`), a body, then EOF.

use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Maximum request size.
pub const MAX_REQUEST_SIZE: usize = 1024;

/// Default I/O timeout for a control connection.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("request is not valid UTF-8")]
    InvalidUtf8,

    #[error("connection closed before a command arrived")]
    ConnectionClosed,

    #[error("timeout")]
    Timeout,
}

/// A parsed control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Dump the fleet as JSON.
    State,
    /// Set the desired fleet size.
    Scale(usize),
}

/// Rejected commands; rendered into the `ERROR` response body.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("usage: scale <n> with {min} <= n <= {max}")]
    ScaleUsage { min: usize, max: usize },
}

/// Parse one command line.
pub fn parse_request(line: &str, min: usize, max: usize) -> Result<Request, RequestError> {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("state") if parts.next().is_none() => Ok(Request::State),
        Some("scale") => {
            let usage = || RequestError::ScaleUsage { min, max };
            let arg = parts.next().ok_or_else(usage)?;
            if parts.next().is_some() {
                return Err(usage());
            }
            let n: usize = arg.parse().map_err(|_| usage())?;
            if !(min..=max).contains(&n) {
                return Err(usage());
            }
            Ok(Request::Scale(n))
        }
        Some(_) => Err(RequestError::UnknownCommand(line.trim().to_string())),
        None => Err(RequestError::UnknownCommand(String::new())),
    }
}

/// Read the command line from a client, with timeout.
pub async fn read_request<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    timeout: Duration,
) -> Result<String, ProtocolError> {
    tokio::time::timeout(timeout, read_command_line(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

async fn read_command_line<R: AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<String, ProtocolError> {
    let mut buf = Vec::with_capacity(256);
    let mut chunk = [0u8; 256];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.contains(&b'\n') || buf.len() >= MAX_REQUEST_SIZE {
            break;
        }
    }

    if buf.is_empty() {
        return Err(ProtocolError::ConnectionClosed);
    }
    buf.truncate(MAX_REQUEST_SIZE);

    let text = std::str::from_utf8(&buf).map_err(|_| ProtocolError::InvalidUtf8)?;
    Ok(text.lines().next().unwrap_or_default().to_string())
}

/// Write an `OK` response and half-close the stream so the client sees EOF.
pub async fn write_ok<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    body: &str,
    timeout: Duration,
) -> Result<(), ProtocolError> {
    write_response(writer, "OK", body, timeout).await
}

/// Write an `ERROR` response and half-close the stream.
pub async fn write_error<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    message: &str,
    timeout: Duration,
) -> Result<(), ProtocolError> {
    write_response(writer, "ERROR", message, timeout).await
}

async fn write_response<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    status: &str,
    body: &str,
    timeout: Duration,
) -> Result<(), ProtocolError> {
    tokio::time::timeout(timeout, async {
        writer.write_all(status.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.write_all(body.as_bytes()).await?;
        if !body.ends_with('\n') {
            writer.write_all(b"\n").await?;
        }
        writer.shutdown().await?;
        Ok(())
    })
    .await
    .map_err(|_| ProtocolError::Timeout)?
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
