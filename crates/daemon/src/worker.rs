// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-VM lifecycle workers.
//!
//! Each VM is driven by short-lived tasks: one launch task, an optional
//! configure task running alongside the probe loop, and one destroy task.
//! Between creation and removal, only these workers mutate the record's
//! state and counters; the reconciler only inserts fresh records and
//! decides when a destroy starts.

use crate::ctx::Ctx;
use crate::probe::{probe, DEFAULT_PROBE_TIMEOUT};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use wso_adapters::{
    CloudInitSpec, Configurer, DomainParams, Hypervisor, HypervisorError, ProvisionError,
    Provisioner,
};
use wso_core::{ProbeOutcome, VmRecord, VmState};

/// A launch is provisioning followed by domain creation; either can fail.
#[derive(Debug, Error)]
enum LaunchError {
    #[error(transparent)]
    Hypervisor(#[from] HypervisorError),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
}

/// Spawn the launch task for a freshly inserted record.
pub fn spawn_launch<H: Hypervisor, P: Provisioner, C: Configurer>(
    ctx: &Arc<Ctx<H, P, C>>,
    record: VmRecord,
) {
    let task_ctx = Arc::clone(ctx);
    let handle = tokio::spawn(async move { run_launch(task_ctx, record).await });
    ctx.tasks.track_launch(handle);
}

async fn run_launch<H: Hypervisor, P: Provisioner, C: Configurer>(
    ctx: Arc<Ctx<H, P, C>>,
    record: VmRecord,
) {
    let name = record.name.clone();
    info!(vm = %name, ip = %record.ip_address, "launching");

    match try_launch(&ctx, &record).await {
        Ok(()) => {
            let started_at = unix_now();
            ctx.fleet.update(&name, |vm| {
                vm.state = VmState::HealthcheckInitializing;
                vm.started_at = Some(started_at);
            });
            ctx.fleet.notify();
            info!(vm = %name, "domain created");

            spawn_configure(&ctx, name.clone(), record.ip_address);
            spawn_probe_loop(&ctx, name, record.ip_address);
        }
        Err(e) => {
            warn!(vm = %name, error = %e, "launch failed, removing record");
            ctx.provisioner.cleanup(&name).await;
            ctx.fleet.remove(&name);
            ctx.fleet.notify();
        }
    }
}

async fn try_launch<H: Hypervisor, P: Provisioner, C: Configurer>(
    ctx: &Ctx<H, P, C>,
    record: &VmRecord,
) -> Result<(), LaunchError> {
    // Shared NAT network comes up lazily with the first launch.
    ctx.network.ensure(&ctx.hypervisor).await?;

    let media = ctx
        .provisioner
        .prepare(
            &record.name,
            &record.image_path,
            &CloudInitSpec {
                hostname: record.name.clone(),
                ip_address: record.ip_address,
                ssh_public_key: ctx.settings.ssh_public_key(),
            },
        )
        .await?;

    let xml = wso_adapters::domain_xml(&DomainParams {
        name: record.name.clone(),
        cpus: record.cpus,
        memory_kib: record.memory_kib,
        emulator: ctx.settings.qemu_binary_path.clone(),
        disk_path: media.disk,
        cloud_init_iso: media.iso,
        network_name: record.network_name.clone(),
    });
    ctx.hypervisor.create_domain(&xml).await?;
    Ok(())
}

/// Spawn the probe loop for a booted VM, registering its abort handle so
/// a destroy worker can cancel it.
fn spawn_probe_loop<H: Hypervisor, P: Provisioner, C: Configurer>(
    ctx: &Arc<Ctx<H, P, C>>,
    name: String,
    ip: Ipv4Addr,
) {
    let task_ctx = Arc::clone(ctx);
    let registered = name.clone();
    let handle = tokio::spawn(async move { run_probe_loop(task_ctx, name, ip).await });
    ctx.tasks.register_probe(&registered, handle.abort_handle());
}

async fn run_probe_loop<H: Hypervisor, P: Provisioner, C: Configurer>(
    ctx: Arc<Ctx<H, P, C>>,
    name: String,
    ip: Ipv4Addr,
) {
    let thresholds = ctx.settings.thresholds();
    let port = ctx.settings.healthcheck_port;

    tokio::time::sleep(ctx.settings.healthcheck_start_delay).await;

    let mut ticker = tokio::time::interval(ctx.settings.healthcheck_interval);
    loop {
        ticker.tick().await;

        let outcome = match probe(ip, port, DEFAULT_PROBE_TIMEOUT).await {
            Ok(()) => ProbeOutcome::Ok,
            Err(e) => {
                debug!(vm = %name, error = %e, "probe failed");
                ProbeOutcome::Failed
            }
        };

        let mut new_state = None;
        let live = ctx.fleet.update(&name, |vm| {
            if vm.apply_probe(outcome, thresholds) {
                new_state = Some(vm.state);
            }
        });
        if !live {
            // Record removed or terminating: the loop's work is done even
            // if nobody aborted it yet.
            debug!(vm = %name, "probe loop ending");
            break;
        }
        if let Some(state) = new_state {
            info!(vm = %name, state = %state, "healthcheck state change");
            ctx.fleet.notify();
        }
    }
}

/// Spawn the post-boot configure task.
fn spawn_configure<H: Hypervisor, P: Provisioner, C: Configurer>(
    ctx: &Arc<Ctx<H, P, C>>,
    name: String,
    ip: Ipv4Addr,
) {
    if ctx.settings.ssh_key_path.is_none() || ctx.settings.vm_setup_script_path.is_none() {
        debug!(vm = %name, "no setup script configured, skipping configuration");
        return;
    }
    let task_ctx = Arc::clone(ctx);
    tokio::spawn(async move { run_configure(task_ctx, name, ip).await });
}

async fn run_configure<H: Hypervisor, P: Provisioner, C: Configurer>(
    ctx: Arc<Ctx<H, P, C>>,
    name: String,
    ip: Ipv4Addr,
) {
    tokio::time::sleep(ctx.settings.configuration_initial_delay).await;

    let retries = ctx.settings.configuration_retries.max(1);
    for attempt in 1..=retries {
        if ctx.fleet.get(&name).is_none() {
            return;
        }
        match ctx.configurer.configure(ip).await {
            Ok(()) => {
                info!(vm = %name, attempt, "configuration complete");
                return;
            }
            Err(e) => {
                warn!(vm = %name, attempt, error = %e, "configuration attempt failed");
                if attempt < retries {
                    tokio::time::sleep(ctx.settings.configuration_retry_interval).await;
                }
            }
        }
    }

    // Exhausted: mark unhealthy and let the reconciler reap it.
    let demoted = ctx.fleet.update(&name, |vm| {
        vm.state = VmState::Unhealthy;
        vm.n_success_healthchecks = 0;
    });
    if demoted {
        error!(vm = %name, "configuration retries exhausted, marking unhealthy");
        ctx.fleet.notify();
    }
}

/// Spawn a destroy worker for a VM.
///
/// Idempotent: the `Terminating` transition and the registry's destroy
/// claim make sure at most one destroy task runs per name. Returns the
/// task handle when one was spawned, so shutdown can await the sweep.
pub fn spawn_destroy<H: Hypervisor, P: Provisioner, C: Configurer>(
    ctx: &Arc<Ctx<H, P, C>>,
    name: String,
) -> Option<JoinHandle<()>> {
    let transitioned = ctx.fleet.begin_terminate(&name);
    if !transitioned && ctx.fleet.get(&name).is_none() {
        return None;
    }
    if !ctx.tasks.claim_destroy(&name) {
        return None;
    }
    if transitioned {
        ctx.fleet.notify();
    }

    let task_ctx = Arc::clone(ctx);
    Some(tokio::spawn(async move { run_destroy(task_ctx, name).await }))
}

async fn run_destroy<H: Hypervisor, P: Provisioner, C: Configurer>(
    ctx: Arc<Ctx<H, P, C>>,
    name: String,
) {
    ctx.tasks.abort_probe(&name);

    match ctx.hypervisor.destroy_domain(&name).await {
        Ok(()) => {
            ctx.provisioner.cleanup(&name).await;
            ctx.fleet.remove(&name);
            info!(vm = %name, "destroyed");
            ctx.fleet.notify();
        }
        Err(e) => {
            // The record stays in Terminating: it blocks a duplicate with
            // the same name until a later destroy attempt succeeds.
            error!(vm = %name, error = %e, "destroy failed, record kept");
        }
    }
    ctx.tasks.release_destroy(&name);
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
