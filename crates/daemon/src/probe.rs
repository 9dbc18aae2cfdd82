// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TCP health probe.

use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;

/// Default probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Probe failures. Never propagated past the worker's state machine.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out")]
    Timeout,
    #[error("connect failed: {0}")]
    Connect(#[from] std::io::Error),
}

/// Attempt one TCP connect to `(ip, port)`.
///
/// On success the connection is closed immediately; the probe only infers
/// that the guest application is accepting connections. No retries: the
/// caller's counters decide what a single outcome means.
pub async fn probe(ip: Ipv4Addr, port: u16, timeout: Duration) -> Result<(), ProbeError> {
    match tokio::time::timeout(timeout, TcpStream::connect((ip, port))).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(ProbeError::Connect(e)),
        Err(_elapsed) => Err(ProbeError::Timeout),
    }
}

#[cfg(test)]
#[path = "probe_tests.rs"]
mod tests;
