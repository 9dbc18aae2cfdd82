// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! wso-adapters: External collaborators behind trait seams.
//!
//! The daemon core consumes three externalities: the hypervisor driver,
//! the VM provisioner (disk overlay, cloud-init media, XML definitions),
//! and the SSH-based post-boot configurer. All blocking work runs as
//! subprocesses on the tokio runtime.

pub mod configure;
pub mod hypervisor;
pub mod provision;
pub mod subprocess;

pub use configure::{ConfigureError, Configurer, SshConfigurer, SshOptions};
pub use hypervisor::{Hypervisor, HypervisorError, VirshHypervisor};
pub use provision::{
    domain_xml, network_xml, CloudInitSpec, DomainParams, PreparedMedia, ProvisionError,
    Provisioner, WorkdirProvisioner,
};

#[cfg(any(test, feature = "test-support"))]
pub use configure::FakeConfigurer;
#[cfg(any(test, feature = "test-support"))]
pub use hypervisor::{FakeHypervisor, HypervisorCall};
#[cfg(any(test, feature = "test-support"))]
pub use provision::{FakeProvisioner, ProvisionCall};
