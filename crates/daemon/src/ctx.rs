// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared daemon context.
//!
//! One `Ctx` is built at startup and shared (via `Arc`) by the listener,
//! the reconciler, and every per-VM worker. The fleet store, the desired
//! size, and the task registry are the only shared mutable state.

use crate::env::Settings;
use crate::fleet::FleetStore;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicUsize;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::info;
use wso_adapters::{network_xml, Configurer, Hypervisor, HypervisorError, Provisioner};
use wso_core::{BRIDGE_NAME, NETWORK_NAME};

/// Shared state for the daemon's tasks.
pub struct Ctx<H: Hypervisor, P: Provisioner, C: Configurer> {
    pub settings: Settings,
    pub fleet: FleetStore,
    /// Target fleet size. Written only by the control listener, read by
    /// the reconciler.
    pub desired: AtomicUsize,
    pub hypervisor: H,
    pub provisioner: P,
    pub configurer: C,
    pub tasks: TaskRegistry,
    pub network: NetworkGuard,
}

impl<H: Hypervisor, P: Provisioner, C: Configurer> Ctx<H, P, C> {
    pub fn new(settings: Settings, hypervisor: H, provisioner: P, configurer: C) -> Self {
        let desired = AtomicUsize::new(settings.min_vms);
        Self {
            settings,
            fleet: FleetStore::new(),
            desired,
            hypervisor,
            provisioner,
            configurer,
            tasks: TaskRegistry::default(),
            network: NetworkGuard::default(),
        }
    }
}

/// Book-keeping for in-flight per-VM tasks.
///
/// Together with `FleetStore::begin_terminate` this enforces the
/// at-most-one-lifecycle-task-per-VM rule: probe loops are registered so
/// destroy workers can cancel them, launch handles are kept so shutdown
/// can await them, and destroy claims stop two workers racing on one name.
#[derive(Default)]
pub struct TaskRegistry {
    probes: Mutex<HashMap<String, AbortHandle>>,
    launches: Mutex<Vec<JoinHandle<()>>>,
    destroys: Mutex<HashSet<String>>,
}

impl TaskRegistry {
    /// Register a VM's probe loop for later cancellation.
    pub fn register_probe(&self, name: &str, handle: AbortHandle) {
        self.probes.lock().insert(name.to_string(), handle);
    }

    /// Cancel a VM's probe loop if one is running.
    pub fn abort_probe(&self, name: &str) {
        if let Some(handle) = self.probes.lock().remove(name) {
            handle.abort();
        }
    }

    /// Track a launch task so shutdown can await it.
    pub fn track_launch(&self, handle: JoinHandle<()>) {
        let mut launches = self.launches.lock();
        launches.retain(|h| !h.is_finished());
        launches.push(handle);
    }

    /// Take all outstanding launch handles.
    pub fn drain_launches(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *self.launches.lock())
    }

    /// Claim the destroy slot for a VM. Returns `false` when a destroy
    /// task is already in flight for this name.
    pub fn claim_destroy(&self, name: &str) -> bool {
        self.destroys.lock().insert(name.to_string())
    }

    /// Release the destroy slot (success or failure) so a later pass may
    /// retry.
    pub fn release_destroy(&self, name: &str) {
        self.destroys.lock().remove(name);
    }
}

/// Lazy-creation guard for the shared NAT network.
///
/// The network is created on the first launch that needs it and destroyed
/// exactly once during shutdown.
#[derive(Default)]
pub struct NetworkGuard {
    active: tokio::sync::Mutex<bool>,
}

impl NetworkGuard {
    /// Make sure the shared network exists, creating it if the hypervisor
    /// doesn't know it yet. Serialized so concurrent launches can't race
    /// two creations.
    pub async fn ensure<H: Hypervisor>(&self, hypervisor: &H) -> Result<(), HypervisorError> {
        let mut active = self.active.lock().await;
        if *active {
            return Ok(());
        }

        if !hypervisor.lookup_network(NETWORK_NAME).await? {
            let xml = network_xml(NETWORK_NAME, BRIDGE_NAME);
            hypervisor.create_network(&xml).await?;
            info!(network = NETWORK_NAME, bridge = BRIDGE_NAME, "created NAT network");
        }
        *active = true;
        Ok(())
    }

    /// Whether the network was observed or created by this daemon.
    pub async fn active(&self) -> bool {
        *self.active.lock().await
    }
}
