//! Test helpers for behavioral specifications.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Returns the path to the wso binary.
///
/// Prefers assert_cmd's resolution, falling back to a path relative to
/// the test binary itself (target/debug/deps/specs-<hash> → target/debug)
/// when the build layout is unusual.
fn wso_binary() -> PathBuf {
    if let Ok(resolved) = std::env::var("CARGO_BIN_EXE_wso") {
        let resolved = PathBuf::from(resolved);
        if resolved.exists() {
            return resolved;
        }
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(debug_dir) = exe.parent().and_then(|d| d.parent()) {
            let fallback = debug_dir.join("wso");
            if fallback.exists() {
                return fallback;
            }
        }
    }

    assert_cmd::cargo::cargo_bin("wso")
}

/// An isolated environment: empty workdir, control port nobody listens on.
pub struct SpecEnv {
    workdir: TempDir,
    port: u16,
}

impl SpecEnv {
    pub fn new() -> Self {
        // Bind then drop to get a port that refuses connections.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        Self {
            workdir: TempDir::new().unwrap(),
            port,
        }
    }

    /// Run `wso <args>` against this environment.
    pub fn wso(&self, args: &[&str]) -> Output {
        let mut cmd = Command::new(wso_binary());
        cmd.args(args)
            .env("WORKDIR", self.workdir.path())
            .env("SERVER_HOST", "127.0.0.1")
            .env("SERVER_PORT", self.port.to_string())
            .env("WSO_TIMEOUT_CONNECT_MS", "200")
            .env("WSO_POLL_MS", "10");
        cmd.output().expect("failed to run wso")
    }
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}
