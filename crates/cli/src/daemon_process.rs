// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon process management utilities.
//!
//! Functions for starting, stopping, and monitoring the wsod process.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

/// Start the daemon in the background, returning the child process handle
pub fn start_daemon_background() -> std::io::Result<std::process::Child> {
    let wsod_path = find_wsod_binary();

    Command::new(&wsod_path)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
}

/// Find the wsod binary: explicit override, then a sibling of the CLI
/// binary, then whatever is on PATH.
pub fn find_wsod_binary() -> PathBuf {
    if let Some(path) = crate::env::daemon_binary() {
        return PathBuf::from(path);
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("wsod");
            if sibling.exists() {
                return sibling;
            }
        }
    }

    PathBuf::from("wsod")
}

/// Get the PID from the daemon PID file, if it exists
pub fn read_daemon_pid() -> Option<u32> {
    read_pid_file(&crate::env::workdir().join("daemon.pid"))
}

/// Parse a PID file (pure logic, no env access).
fn read_pid_file(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Execute kill with the given signal and PID
fn kill_signal(signal: &str, pid: u32) -> bool {
    Command::new("kill")
        .args([signal, &pid.to_string()])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Check if a process with the given PID exists
pub fn process_exists(pid: u32) -> bool {
    kill_signal("-0", pid)
}

/// Ask the daemon to shut down gracefully.
pub fn terminate(pid: u32) -> bool {
    kill_signal("-15", pid)
}

/// Wait for a process to exit
pub async fn wait_for_exit(pid: u32, timeout: std::time::Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if !process_exists(pid) {
            return true;
        }
        tokio::time::sleep(crate::env::poll_interval()).await;
    }
    false
}

#[cfg(test)]
#[path = "daemon_process_tests.rs"]
mod tests;
