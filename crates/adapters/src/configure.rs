// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SSH-based post-boot configuration.
//!
//! One invocation = one attempt: the setup script is piped to a shell on
//! the guest over SSH. Retry pacing belongs to the caller's state machine,
//! and no timeout is layered on top of what SSH itself enforces.

use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

/// Errors from a configuration attempt
#[derive(Debug, Error)]
pub enum ConfigureError {
    #[error("setup script unreadable: {0}")]
    Script(std::io::Error),
    #[error("ssh invocation failed: {0}")]
    Invocation(std::io::Error),
    #[error("setup failed on {ip}: {stderr}")]
    SetupFailed { ip: Ipv4Addr, stderr: String },
}

/// Adapter for post-boot guest configuration.
#[async_trait]
pub trait Configurer: Clone + Send + Sync + 'static {
    /// Run one setup attempt against a guest.
    async fn configure(&self, ip: Ipv4Addr) -> Result<(), ConfigureError>;
}

/// How to reach a guest for configuration.
#[derive(Debug, Clone)]
pub struct SshOptions {
    pub key_path: PathBuf,
    pub script_path: PathBuf,
    pub user: String,
}

impl SshOptions {
    pub fn new(key_path: PathBuf, script_path: PathBuf) -> Self {
        Self {
            key_path,
            script_path,
            user: "root".to_string(),
        }
    }
}

/// SSH configurer. Unconfigured (no key or script) means every attempt
/// trivially succeeds, so fleets without a setup script skip the step.
#[derive(Debug, Clone, Default)]
pub struct SshConfigurer {
    opts: Option<SshOptions>,
}

impl SshConfigurer {
    pub fn new(opts: Option<SshOptions>) -> Self {
        Self { opts }
    }
}

#[async_trait]
impl Configurer for SshConfigurer {
    async fn configure(&self, ip: Ipv4Addr) -> Result<(), ConfigureError> {
        let Some(opts) = &self.opts else {
            tracing::debug!(%ip, "no setup script configured, nothing to do");
            return Ok(());
        };

        let script = std::fs::File::open(&opts.script_path).map_err(ConfigureError::Script)?;

        let output = Command::new("ssh")
            .arg("-i")
            .arg(&opts.key_path)
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg("UserKnownHostsFile=/dev/null")
            .arg("-o")
            .arg("BatchMode=yes")
            .arg(format!("{}@{}", opts.user, ip))
            .arg("sh -s")
            .stdin(Stdio::from(script))
            .output()
            .await
            .map_err(ConfigureError::Invocation)?;

        if !output.status.success() {
            return Err(ConfigureError::SetupFailed {
                ip,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        tracing::debug!(%ip, "guest configuration succeeded");
        Ok(())
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{ConfigureError, Configurer};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeState {
        calls: Vec<Ipv4Addr>,
        failures: VecDeque<String>,
    }

    /// Fake configurer for testing. Succeeds unless failures are queued.
    #[derive(Clone, Default)]
    pub struct FakeConfigurer {
        inner: Arc<Mutex<FakeState>>,
    }

    impl FakeConfigurer {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue `n` failing attempts before attempts succeed again.
        pub fn queue_failures(&self, n: usize) {
            let mut inner = self.inner.lock();
            for _ in 0..n {
                inner.failures.push_back("injected failure".to_string());
            }
        }

        /// All attempted addresses, in order.
        pub fn calls(&self) -> Vec<Ipv4Addr> {
            self.inner.lock().calls.clone()
        }
    }

    #[async_trait]
    impl Configurer for FakeConfigurer {
        async fn configure(&self, ip: Ipv4Addr) -> Result<(), ConfigureError> {
            let mut inner = self.inner.lock();
            inner.calls.push(ip);
            match inner.failures.pop_front() {
                Some(stderr) => Err(ConfigureError::SetupFailed { ip, stderr }),
                None => Ok(()),
            }
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeConfigurer;
