// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory fleet store with an edge-triggered change signal.
//!
//! The store is the single authoritative map of VM records. Mutations are
//! serialized under one mutex; readers take atomic snapshots. The change
//! signal has collapse semantics: any number of `notify()` calls while
//! nobody waits produce exactly one wake-up, and `wait()` clears the
//! signal on return. The reconciler re-reads the whole fleet on each wake,
//! so per-change granularity is never needed.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use thiserror::Error;
use tokio::sync::Notify;
use wso_core::{VmRecord, VmState};

/// Fleet store errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FleetError {
    #[error("a VM named {0:?} already exists")]
    DuplicateName(String),
}

/// Authoritative `name -> VM record` map plus the change signal.
#[derive(Default)]
pub struct FleetStore {
    vms: Mutex<HashMap<String, VmRecord>>,
    signal: Notify,
}

impl FleetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh record. The name is the primary key.
    pub fn insert(&self, record: VmRecord) -> Result<(), FleetError> {
        let mut vms = self.vms.lock();
        if vms.contains_key(&record.name) {
            return Err(FleetError::DuplicateName(record.name));
        }
        vms.insert(record.name.clone(), record);
        Ok(())
    }

    /// Mutate a record under the lock.
    ///
    /// Returns `false` without calling the mutator when the record is
    /// missing or already in `Terminating`: a terminating record belongs
    /// to its destroy worker alone.
    pub fn update(&self, name: &str, f: impl FnOnce(&mut VmRecord)) -> bool {
        let mut vms = self.vms.lock();
        match vms.get_mut(name) {
            Some(vm) if vm.state != VmState::Terminating => {
                f(vm);
                true
            }
            _ => false,
        }
    }

    /// Transition a record into `Terminating`.
    ///
    /// Returns `true` iff this call performed the transition. `Terminating`
    /// has no way back, so exactly one caller ever wins, which is what
    /// makes reaping idempotent.
    pub fn begin_terminate(&self, name: &str) -> bool {
        let mut vms = self.vms.lock();
        match vms.get_mut(name) {
            Some(vm) if vm.state != VmState::Terminating => {
                vm.state = VmState::Terminating;
                true
            }
            _ => false,
        }
    }

    /// Remove a record, returning it. Destroy workers call this once the
    /// hypervisor has confirmed the domain is gone.
    pub fn remove(&self, name: &str) -> Option<VmRecord> {
        self.vms.lock().remove(name)
    }

    /// Clone of one record.
    pub fn get(&self, name: &str) -> Option<VmRecord> {
        self.vms.lock().get(name).cloned()
    }

    /// Consistent snapshot of all records.
    pub fn snapshot(&self) -> Vec<VmRecord> {
        self.vms.lock().values().cloned().collect()
    }

    /// Addresses currently assigned, for the IP allocator.
    pub fn occupied_ips(&self) -> HashSet<Ipv4Addr> {
        self.vms.lock().values().map(|vm| vm.ip_address).collect()
    }

    pub fn len(&self) -> usize {
        self.vms.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vms.lock().is_empty()
    }

    /// Mark the change signal set. Collapses with any signal already set.
    pub fn notify(&self) {
        self.signal.notify_one();
    }

    /// Wait until the change signal is set, clearing it atomically.
    pub async fn wait(&self) {
        self.signal.notified().await;
    }
}

#[cfg(test)]
#[path = "fleet_tests.rs"]
mod tests;
