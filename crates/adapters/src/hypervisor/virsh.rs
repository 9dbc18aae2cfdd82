// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! virsh-based hypervisor adapter.

use super::{Hypervisor, HypervisorError};
use crate::subprocess::{run_with_timeout, VIRSH_TIMEOUT};
use async_trait::async_trait;
use std::io::Write;
use tokio::process::Command;

/// Hypervisor adapter shelling out to `virsh -c <url>`.
///
/// Each operation spawns its own virsh process, so each operation opens
/// and closes its own driver connection.
#[derive(Clone)]
pub struct VirshHypervisor {
    url: String,
}

impl VirshHypervisor {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("virsh");
        cmd.arg("-c").arg(&self.url);
        cmd
    }

    /// Run a virsh subcommand that takes an XML definition file.
    ///
    /// virsh only reads definitions from files, so the XML is staged in a
    /// temp file that lives until the call returns.
    async fn run_with_xml(&self, subcommand: &str, xml: &str) -> Result<(), String> {
        let mut file = tempfile::Builder::new()
            .prefix("wso-")
            .suffix(".xml")
            .tempfile()
            .map_err(|e| format!("staging XML: {}", e))?;
        file.write_all(xml.as_bytes())
            .map_err(|e| format!("staging XML: {}", e))?;

        let mut cmd = self.command();
        cmd.arg(subcommand).arg(file.path());

        let output = run_with_timeout(cmd, VIRSH_TIMEOUT, subcommand).await?;
        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl Hypervisor for VirshHypervisor {
    async fn create_domain(&self, xml: &str) -> Result<(), HypervisorError> {
        self.run_with_xml("create", xml)
            .await
            .map_err(HypervisorError::CreateDomain)
    }

    async fn destroy_domain(&self, name: &str) -> Result<(), HypervisorError> {
        let mut cmd = self.command();
        cmd.arg("destroy").arg(name);

        let output = run_with_timeout(cmd, VIRSH_TIMEOUT, "destroy")
            .await
            .map_err(|reason| HypervisorError::DestroyDomain {
                name: name.to_string(),
                reason,
            })?;

        if !output.status.success() {
            return Err(HypervisorError::DestroyDomain {
                name: name.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    async fn lookup_network(&self, name: &str) -> Result<bool, HypervisorError> {
        let mut cmd = self.command();
        cmd.arg("net-info").arg(name);

        let output = run_with_timeout(cmd, VIRSH_TIMEOUT, "net-info")
            .await
            .map_err(HypervisorError::Unreachable)?;

        if output.status.success() {
            return Ok(true);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.to_ascii_lowercase().contains("not found") {
            return Ok(false);
        }
        Err(HypervisorError::Unreachable(stderr.trim().to_string()))
    }

    async fn create_network(&self, xml: &str) -> Result<(), HypervisorError> {
        self.run_with_xml("net-create", xml)
            .await
            .map_err(HypervisorError::CreateNetwork)
    }

    async fn destroy_network(&self, name: &str) -> Result<(), HypervisorError> {
        let mut cmd = self.command();
        cmd.arg("net-destroy").arg(name);

        let output = run_with_timeout(cmd, VIRSH_TIMEOUT, "net-destroy")
            .await
            .map_err(|reason| HypervisorError::DestroyNetwork {
                name: name.to_string(),
                reason,
            })?;

        if !output.status.success() {
            return Err(HypervisorError::DestroyNetwork {
                name: name.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
