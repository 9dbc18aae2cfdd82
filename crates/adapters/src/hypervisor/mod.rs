// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hypervisor driver adapters.
//!
//! The daemon only ever creates transient domains and networks: nothing
//! it makes survives a host reboot, so recovery is always "destroy and
//! relaunch".

mod virsh;

pub use virsh::VirshHypervisor;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeHypervisor, HypervisorCall};

use async_trait::async_trait;
use thiserror::Error;

/// Errors from hypervisor operations
#[derive(Debug, Error)]
pub enum HypervisorError {
    #[error("domain create failed: {0}")]
    CreateDomain(String),
    #[error("domain destroy failed: {name}: {reason}")]
    DestroyDomain { name: String, reason: String },
    #[error("network create failed: {0}")]
    CreateNetwork(String),
    #[error("network destroy failed: {name}: {reason}")]
    DestroyNetwork { name: String, reason: String },
    #[error("hypervisor unreachable: {0}")]
    Unreachable(String),
}

/// Adapter for the hypervisor driver.
///
/// One driver invocation per operation; implementations must not hold a
/// connection across calls, and concurrent calls are permitted.
#[async_trait]
pub trait Hypervisor: Clone + Send + Sync + 'static {
    /// Create a transient domain from an XML definition.
    async fn create_domain(&self, xml: &str) -> Result<(), HypervisorError>;

    /// Destroy a running domain by name.
    async fn destroy_domain(&self, name: &str) -> Result<(), HypervisorError>;

    /// Check whether a network with this name exists.
    async fn lookup_network(&self, name: &str) -> Result<bool, HypervisorError>;

    /// Create a transient network from an XML definition.
    async fn create_network(&self, xml: &str) -> Result<(), HypervisorError>;

    /// Destroy a network by name.
    async fn destroy_network(&self, name: &str) -> Result<(), HypervisorError>;
}
