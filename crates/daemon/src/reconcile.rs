// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The reconciler: the single writer of fleet-cardinality decisions.
//!
//! Edge-triggered loop: each wake-up re-reads the whole fleet, reaps
//! unhealthy records, launches replacements up to the desired size, and
//! trims excess healthy VMs. Workers signal the fleet store on every state
//! change, so any change is observed on the next wake; collapsed
//! notifications just mean one wake handles several changes.

use crate::ctx::Ctx;
use crate::env::Settings;
use crate::worker;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::net::Ipv4Addr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info};
use wso_adapters::{Configurer, Hypervisor, Provisioner};
use wso_core::{allocate_ip, domain_name, new_vm_id, VmRecord, VmState, BRIDGE_NAME, NETWORK_NAME};

/// Run the reconciler until the task is aborted.
pub async fn run<H: Hypervisor, P: Provisioner, C: Configurer>(ctx: Arc<Ctx<H, P, C>>) {
    let mut rng = StdRng::from_os_rng();
    loop {
        ctx.fleet.wait().await;
        reconcile_once(&ctx, &mut rng);
    }
}

/// One reconciliation pass over a fleet snapshot.
pub fn reconcile_once<H: Hypervisor, P: Provisioner, C: Configurer, R: Rng>(
    ctx: &Arc<Ctx<H, P, C>>,
    rng: &mut R,
) {
    let desired = ctx.desired.load(Ordering::SeqCst);
    let snapshot = ctx.fleet.snapshot();

    // Reap unhealthy records, plus terminating leftovers whose previous
    // destroy attempt failed. spawn_destroy is idempotent, so records
    // with a destroy already in flight are skipped.
    for vm in &snapshot {
        if matches!(vm.state, VmState::Unhealthy | VmState::Terminating) {
            worker::spawn_destroy(ctx, vm.name.clone());
        }
    }

    let running = snapshot.iter().filter(|vm| vm.state.is_running()).count();
    let healthy: Vec<&VmRecord> = snapshot
        .iter()
        .filter(|vm| vm.state == VmState::Healthy)
        .collect();

    if running < desired {
        launch_replacements(ctx, desired - running, rng);
    } else if healthy.len() > desired {
        let excess = healthy.len() - desired;
        info!(excess, desired, "trimming excess healthy VMs");
        for name in choose_victims(&healthy, excess, rng) {
            worker::spawn_destroy(ctx, name);
        }
    }
}

fn launch_replacements<H: Hypervisor, P: Provisioner, C: Configurer, R: Rng>(
    ctx: &Arc<Ctx<H, P, C>>,
    deficit: usize,
    rng: &mut R,
) {
    let mut occupied = ctx.fleet.occupied_ips();
    for _ in 0..deficit {
        let ip = match allocate_ip(&occupied, rng) {
            Ok(ip) => ip,
            Err(e) => {
                error!(error = %e, "cannot allocate an address for a new VM");
                break;
            }
        };
        occupied.insert(ip);

        let record = fresh_record(&ctx.settings, ip);
        info!(vm = %record.name, ip = %ip, "creating record");
        if let Err(e) = ctx.fleet.insert(record.clone()) {
            error!(error = %e, "record insert failed");
            continue;
        }
        worker::spawn_launch(ctx, record);
    }
}

/// Build a fresh record in `Launching` with a newly drawn id.
pub fn fresh_record(settings: &Settings, ip: Ipv4Addr) -> VmRecord {
    let id = new_vm_id();
    VmRecord {
        name: domain_name(&id),
        id,
        state: VmState::Launching,
        cpus: settings.vm_cpus,
        memory_kib: settings.vm_memory_kib,
        image_path: settings.image_path.clone(),
        network_name: NETWORK_NAME.to_string(),
        bridge_name: BRIDGE_NAME.to_string(),
        ip_address: ip,
        n_success_healthchecks: 0,
        n_failed_healthchecks: 0,
        started_at: None,
    }
}

/// Pick scale-down victims uniformly at random, so trim under churn does
/// not consistently favor one cohort.
fn choose_victims<R: Rng>(healthy: &[&VmRecord], excess: usize, rng: &mut R) -> Vec<String> {
    rand::seq::index::sample(rng, healthy.len(), excess.min(healthy.len()))
        .into_iter()
        .map(|i| healthy[i].name.clone())
        .collect()
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
