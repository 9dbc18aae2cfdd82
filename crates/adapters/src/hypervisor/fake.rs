// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake hypervisor adapter for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{Hypervisor, HypervisorError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Recorded hypervisor call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HypervisorCall {
    CreateDomain { name: String },
    DestroyDomain { name: String },
    LookupNetwork { name: String },
    CreateNetwork { name: String },
    DestroyNetwork { name: String },
}

#[derive(Default)]
struct FakeState {
    domains: HashSet<String>,
    networks: HashSet<String>,
    calls: Vec<HypervisorCall>,
    fail_create_domain: bool,
    fail_destroy: HashSet<String>,
}

/// Fake hypervisor adapter for testing
#[derive(Clone, Default)]
pub struct FakeHypervisor {
    inner: Arc<Mutex<FakeState>>,
}

impl FakeHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<HypervisorCall> {
        self.inner.lock().calls.clone()
    }

    /// Names of currently live domains
    pub fn domains(&self) -> HashSet<String> {
        self.inner.lock().domains.clone()
    }

    /// Names of currently live networks
    pub fn networks(&self) -> HashSet<String> {
        self.inner.lock().networks.clone()
    }

    /// Make every subsequent create_domain call fail
    pub fn fail_create_domain(&self, fail: bool) {
        self.inner.lock().fail_create_domain = fail;
    }

    /// Make destroy_domain fail for this name
    pub fn fail_destroy(&self, name: &str) {
        self.inner.lock().fail_destroy.insert(name.to_string());
    }

    /// Stop failing destroy_domain for this name
    pub fn clear_fail_destroy(&self, name: &str) {
        self.inner.lock().fail_destroy.remove(name);
    }
}

/// Pull the `<name>` element out of a domain/network definition.
fn xml_name(xml: &str) -> String {
    xml.split_once("<name>")
        .and_then(|(_, rest)| rest.split_once("</name>"))
        .map(|(name, _)| name.trim().to_string())
        .unwrap_or_default()
}

#[async_trait]
impl Hypervisor for FakeHypervisor {
    async fn create_domain(&self, xml: &str) -> Result<(), HypervisorError> {
        let name = xml_name(xml);
        let mut inner = self.inner.lock();
        inner.calls.push(HypervisorCall::CreateDomain {
            name: name.clone(),
        });

        if inner.fail_create_domain {
            return Err(HypervisorError::CreateDomain(format!(
                "injected create failure for {}",
                name
            )));
        }
        inner.domains.insert(name);
        Ok(())
    }

    async fn destroy_domain(&self, name: &str) -> Result<(), HypervisorError> {
        let mut inner = self.inner.lock();
        inner.calls.push(HypervisorCall::DestroyDomain {
            name: name.to_string(),
        });

        if inner.fail_destroy.contains(name) {
            return Err(HypervisorError::DestroyDomain {
                name: name.to_string(),
                reason: "injected destroy failure".to_string(),
            });
        }
        inner.domains.remove(name);
        Ok(())
    }

    async fn lookup_network(&self, name: &str) -> Result<bool, HypervisorError> {
        let mut inner = self.inner.lock();
        inner.calls.push(HypervisorCall::LookupNetwork {
            name: name.to_string(),
        });
        Ok(inner.networks.contains(name))
    }

    async fn create_network(&self, xml: &str) -> Result<(), HypervisorError> {
        let name = xml_name(xml);
        let mut inner = self.inner.lock();
        inner.calls.push(HypervisorCall::CreateNetwork {
            name: name.clone(),
        });
        inner.networks.insert(name);
        Ok(())
    }

    async fn destroy_network(&self, name: &str) -> Result<(), HypervisorError> {
        let mut inner = self.inner.lock();
        inner.calls.push(HypervisorCall::DestroyNetwork {
            name: name.to_string(),
        });
        inner.networks.remove(name);
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
