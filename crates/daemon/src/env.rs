// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon.
//!
//! Every knob is read once at startup into [`Settings`]; nothing else in
//! the daemon touches the process environment.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use wso_core::vm::Thresholds;

/// Settings errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{var} has invalid value {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Daemon configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// URL handed to the hypervisor driver.
    pub hypervisor_url: String,
    /// Base disk image every VM boots from.
    pub image_path: PathBuf,
    /// Emulator binary path placed in the domain definition.
    pub qemu_binary_path: PathBuf,
    /// Directory for the PID file, log, and per-VM artifacts.
    pub workdir: PathBuf,
    /// Control socket bind address.
    pub server_host: String,
    pub server_port: u16,
    /// Application port probed on each VM.
    pub healthcheck_port: u16,
    /// Delay between launch and the first probe.
    pub healthcheck_start_delay: Duration,
    /// Delay between probes.
    pub healthcheck_interval: Duration,
    /// Consecutive OK probes required for `Healthy`.
    pub healthcheck_healthy_threshold: u32,
    /// Consecutive failed probes required for `Unhealthy`.
    pub healthcheck_unhealthy_threshold: u32,
    pub configuration_initial_delay: Duration,
    pub configuration_retry_interval: Duration,
    pub configuration_retries: u32,
    /// Bounds on the desired fleet size; desired starts at `min_vms`.
    pub min_vms: usize,
    pub max_vms: usize,
    /// Private key for the SSH configurer; its `.pub` sibling is installed
    /// on guests via cloud-init.
    pub ssh_key_path: Option<PathBuf>,
    pub vm_setup_script_path: Option<PathBuf>,
    /// Provisioning parameters applied to every VM.
    pub vm_cpus: u32,
    pub vm_memory_kib: u64,
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read settings from an arbitrary lookup (tests inject maps).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let image_path = lookup("IMAGE_PATH").ok_or(SettingsError::Missing("IMAGE_PATH"))?;

        Ok(Self {
            hypervisor_url: lookup("HYPERVISOR_URL")
                .unwrap_or_else(|| "qemu:///system".to_string()),
            image_path: PathBuf::from(image_path),
            qemu_binary_path: lookup("QEMU_BINARY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/usr/bin/qemu-system-x86_64")),
            workdir: lookup("WORKDIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/tmp/wso-scaler")),
            server_host: lookup("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            server_port: parse(&lookup, "SERVER_PORT", 9124)?,
            healthcheck_port: parse(&lookup, "HEALTHCHECK_PORT", 80)?,
            healthcheck_start_delay: secs(&lookup, "HEALTHCHECK_START_DELAY", 45.0)?,
            healthcheck_interval: secs(&lookup, "HEALTHCHECK_INTERVAL", 5.0)?,
            healthcheck_healthy_threshold: parse(&lookup, "HEALTHCHECK_HEALTHY_THRESHOLD", 3)?,
            healthcheck_unhealthy_threshold: parse(&lookup, "HEALTHCHECK_UNHEALTHY_THRESHOLD", 3)?,
            configuration_initial_delay: secs(&lookup, "CONFIGURATION_INITIAL_DELAY", 30.0)?,
            configuration_retry_interval: secs(&lookup, "CONFIGURATION_RETRY_INTERVAL", 10.0)?,
            configuration_retries: parse(&lookup, "CONFIGURATION_RETRIES", 5)?,
            min_vms: parse(&lookup, "MIN_VMS", 1)?,
            max_vms: parse(&lookup, "MAX_VMS", 100)?,
            ssh_key_path: lookup("SSH_KEY_PATH").map(PathBuf::from),
            vm_setup_script_path: lookup("VM_SETUP_SCRIPT_PATH").map(PathBuf::from),
            vm_cpus: parse(&lookup, "VM_CPUS", 2)?,
            vm_memory_kib: parse(&lookup, "VM_MEMORY_KIB", 2_097_152)?,
        })
    }

    /// Healthcheck thresholds as the core state machine consumes them.
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            healthy: self.healthcheck_healthy_threshold,
            unhealthy: self.healthcheck_unhealthy_threshold,
        }
    }

    /// Contents of the operator's public key, if a key pair is configured.
    pub fn ssh_public_key(&self) -> Option<String> {
        let key_path = self.ssh_key_path.as_ref()?;
        std::fs::read_to_string(key_path.with_extension("pub")).ok()
    }
}

fn parse<T: std::str::FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, SettingsError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| SettingsError::Invalid { var, value }),
    }
}

/// Durations are given in seconds; fractions are accepted.
fn secs(
    lookup: impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: f64,
) -> Result<Duration, SettingsError> {
    let seconds: f64 = parse(lookup, var, default)?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(SettingsError::Invalid {
            var,
            value: seconds.to_string(),
        });
    }
    Ok(Duration::from_secs_f64(seconds))
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
