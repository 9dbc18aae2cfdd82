// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the CLI.
//!
//! The CLI reads the same variables the daemon binds with, so both sides
//! agree on the control socket and workdir without extra flags.

use std::path::PathBuf;
use std::time::Duration;

/// Control socket address (`SERVER_HOST`, `SERVER_PORT`).
pub fn server_addr() -> (String, u16) {
    let host = std::env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("SERVER_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(9124);
    (host, port)
}

/// Daemon workdir (`WORKDIR`); holds the PID file.
pub fn workdir() -> PathBuf {
    std::env::var("WORKDIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp/wso-scaler"))
}

/// Explicit daemon binary override (`WSO_DAEMON_BINARY`).
pub fn daemon_binary() -> Option<String> {
    std::env::var("WSO_DAEMON_BINARY").ok()
}

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Timeout for waiting for the daemon to start accepting connections.
pub fn timeout_connect() -> Duration {
    parse_duration_ms("WSO_TIMEOUT_CONNECT_MS").unwrap_or(Duration::from_secs(10))
}

/// Timeout for waiting for the daemon process to exit on `stop`.
///
/// Generous by default: shutdown destroys every VM in the fleet.
pub fn timeout_exit() -> Duration {
    parse_duration_ms("WSO_TIMEOUT_EXIT_MS").unwrap_or(Duration::from_secs(60))
}

/// Polling interval for connection/exit retries.
pub fn poll_interval() -> Duration {
    parse_duration_ms("WSO_POLL_MS").unwrap_or(Duration::from_millis(100))
}
