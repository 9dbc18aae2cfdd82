// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon client for CLI commands.
//!
//! One connection per command: write the command line, read the status
//! line and body until EOF.

use std::time::Instant;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("daemon not running")]
    DaemonNotRunning,

    #[error("{0}")]
    Rejected(String),

    #[error("malformed response from daemon")]
    MalformedResponse,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Daemon client bound to a control socket address.
pub struct DaemonClient {
    host: String,
    port: u16,
}

impl DaemonClient {
    pub fn from_env() -> Self {
        let (host, port) = crate::env::server_addr();
        Self { host, port }
    }

    /// Send one command and return the `OK` body.
    pub async fn send(&self, command: &str) -> Result<String, ClientError> {
        let mut stream = self.connect().await?;

        stream.write_all(command.as_bytes()).await?;
        stream.write_all(b"\n").await?;

        let mut response = String::new();
        stream.read_to_string(&mut response).await?;
        parse_response(&response)
    }

    /// Whether the control socket accepts connections.
    pub async fn is_up(&self) -> bool {
        self.connect().await.is_ok()
    }

    /// Wait until the control socket accepts connections.
    pub async fn wait_until_up(&self) -> bool {
        let deadline = crate::env::timeout_connect();
        let start = Instant::now();
        while start.elapsed() < deadline {
            if self.is_up().await {
                return true;
            }
            tokio::time::sleep(crate::env::poll_interval()).await;
        }
        false
    }

    async fn connect(&self) -> Result<TcpStream, ClientError> {
        TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::ConnectionRefused => ClientError::DaemonNotRunning,
                _ => ClientError::Io(e),
            })
    }
}

/// Split a raw response into status line and body.
fn parse_response(raw: &str) -> Result<String, ClientError> {
    let (status, body) = raw.split_once('\n').ok_or(ClientError::MalformedResponse)?;
    match status.trim() {
        "OK" => Ok(body.trim_end().to_string()),
        "ERROR" => Err(ClientError::Rejected(body.trim().to_string())),
        _ => Err(ClientError::MalformedResponse),
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
