// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, shutdown.

use crate::ctx::Ctx;
use crate::env::{Settings, SettingsError};
use crate::worker;
use fs2::FileExt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use wso_adapters::{
    Configurer, Hypervisor, Provisioner, SshConfigurer, SshOptions, VirshHypervisor,
    WorkdirProvisioner,
};
use wso_core::{validate_bridge_name, NetError, BRIDGE_NAME, NETWORK_NAME};

/// Daemon context with concrete adapter types.
pub type DaemonCtx = Ctx<VirshHypervisor, WorkdirProvisioner, SshConfigurer>;

/// On-disk locations derived from the workdir.
#[derive(Debug, Clone)]
pub struct Paths {
    pub workdir: PathBuf,
    /// PID/lock file
    pub pid_path: PathBuf,
    /// Daemon log file
    pub log_path: PathBuf,
}

impl Paths {
    pub fn new(workdir: &Path) -> Self {
        Self {
            workdir: workdir.to_path_buf(),
            pid_path: workdir.join("daemon.pid"),
            log_path: workdir.join("server.log"),
        }
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("failed to bind control socket at {0}: {1}")]
    BindFailed(String, std::io::Error),

    #[error("base image {0} does not exist")]
    ImageMissing(PathBuf),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Net(#[from] NetError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("shutdown incomplete: {0} resource(s) left behind")]
    ShutdownIncomplete(usize),
}

/// Daemon state during operation.
///
/// The TCP listener is returned separately from startup to be spawned as
/// the listener task.
pub struct DaemonState {
    ctx: Arc<DaemonCtx>,
    paths: Paths,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
}

impl DaemonState {
    pub fn ctx(&self) -> Arc<DaemonCtx> {
        Arc::clone(&self.ctx)
    }

    /// Tear down the fleet, the shared network, and the PID file.
    ///
    /// Callers must stop the listener and reconciler tasks first: no new
    /// launches may start while the sweep runs.
    pub async fn shutdown(&self) -> Result<(), LifecycleError> {
        let result = drain_fleet(&self.ctx).await;

        if self.paths.pid_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.paths.pid_path) {
                warn!("failed to remove PID file: {}", e);
            }
        }

        info!("daemon shutdown complete");
        result
    }
}

/// Result of daemon startup.
pub struct StartupResult {
    pub daemon: DaemonState,
    /// The control socket to spawn as the listener task.
    pub listener: TcpListener,
}

impl std::fmt::Debug for StartupResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartupResult").finish_non_exhaustive()
    }
}

/// Start the daemon: lock the PID file, validate inputs, bind the control
/// socket, and assemble the shared context.
pub async fn startup(settings: Settings) -> Result<StartupResult, LifecycleError> {
    let paths = Paths::new(&settings.workdir);
    std::fs::create_dir_all(&paths.workdir)?;

    // Acquire the lock FIRST - prevents races. Open without truncating so
    // a failed attempt can't wipe the running daemon's PID.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&paths.pid_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;

    // Write PID (truncate now that we hold the lock)
    use std::io::Write;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file; // Drop mutability

    // Fail fast on bad inputs, before anything reaches the hypervisor.
    if !settings.image_path.exists() {
        return Err(LifecycleError::ImageMissing(settings.image_path.clone()));
    }
    validate_bridge_name(BRIDGE_NAME)?;

    let bind_addr = format!("{}:{}", settings.server_host, settings.server_port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| LifecycleError::BindFailed(bind_addr.clone(), e))?;

    let hypervisor = VirshHypervisor::new(settings.hypervisor_url.clone());
    let provisioner = WorkdirProvisioner::new(settings.workdir.clone());
    let configurer = SshConfigurer::new(ssh_options(&settings));

    let ctx = Arc::new(Ctx::new(settings, hypervisor, provisioner, configurer));

    info!(addr = %bind_addr, "daemon started");

    Ok(StartupResult {
        daemon: DaemonState {
            ctx,
            paths,
            lock_file,
        },
        listener,
    })
}

fn ssh_options(settings: &Settings) -> Option<SshOptions> {
    match (&settings.ssh_key_path, &settings.vm_setup_script_path) {
        (Some(key), Some(script)) => Some(SshOptions::new(key.clone(), script.clone())),
        _ => None,
    }
}

/// Destroy every VM in the fleet and then the shared network.
///
/// Outstanding launch tasks are awaited first so no VM is caught half
/// created; their records then join the destroy sweep. Records whose
/// destroy fails stay in the fleet and count as shutdown failures.
pub async fn drain_fleet<H: Hypervisor, P: Provisioner, C: Configurer>(
    ctx: &Arc<Ctx<H, P, C>>,
) -> Result<(), LifecycleError> {
    info!("shutting down: draining fleet");

    for handle in ctx.tasks.drain_launches() {
        let _ = handle.await;
    }

    let mut handles = Vec::new();
    for vm in ctx.fleet.snapshot() {
        if let Some(handle) = worker::spawn_destroy(ctx, vm.name) {
            handles.push(handle);
        }
    }
    for handle in handles {
        let _ = handle.await;
    }

    let mut failures = ctx.fleet.len();
    if failures > 0 {
        error!(remaining = failures, "fleet not empty after destroy sweep");
    }

    if ctx.network.active().await {
        match ctx.hypervisor.destroy_network(NETWORK_NAME).await {
            Ok(()) => info!(network = NETWORK_NAME, "destroyed NAT network"),
            Err(e) => {
                error!(error = %e, "network destroy failed");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Err(LifecycleError::ShutdownIncomplete(failures));
    }
    Ok(())
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
