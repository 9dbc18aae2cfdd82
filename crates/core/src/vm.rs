// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! VM record and healthcheck state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;

/// Lifecycle state of a managed VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmState {
    /// Domain creation in flight.
    Launching,
    /// Post-boot configuration in flight.
    Configuring,
    /// Booted; waiting for enough consecutive successful probes.
    HealthcheckInitializing,
    Healthy,
    Unhealthy,
    /// Destruction in flight. Terminal: the only exit is removal.
    Terminating,
}

impl VmState {
    /// States that count toward fleet capacity when the reconciler sizes
    /// the fleet.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            VmState::Launching
                | VmState::Configuring
                | VmState::HealthcheckInitializing
                | VmState::Healthy
        )
    }
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmState::Launching => write!(f, "launching"),
            VmState::Configuring => write!(f, "configuring"),
            VmState::HealthcheckInitializing => write!(f, "healthcheck_initializing"),
            VmState::Healthy => write!(f, "healthy"),
            VmState::Unhealthy => write!(f, "unhealthy"),
            VmState::Terminating => write!(f, "terminating"),
        }
    }
}

/// Outcome of a single health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ok,
    Failed,
}

/// Healthcheck thresholds: consecutive probe counts required to change state.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub healthy: u32,
    pub unhealthy: u32,
}

/// One managed VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmRecord {
    /// 8-character opaque token, unique for the daemon's lifetime.
    pub id: String,
    /// Domain name presented to the hypervisor (`wso-<id>`). Primary key.
    pub name: String,
    pub state: VmState,
    pub cpus: u32,
    pub memory_kib: u64,
    pub image_path: PathBuf,
    pub network_name: String,
    pub bridge_name: String,
    /// Static address from the NAT subnet; chosen at creation, immutable.
    pub ip_address: Ipv4Addr,
    pub n_success_healthchecks: u32,
    pub n_failed_healthchecks: u32,
    /// Unix timestamp of the launch call returning; `None` until then.
    pub started_at: Option<u64>,
}

impl VmRecord {
    /// Apply one probe outcome to the healthcheck counters.
    ///
    /// Counters are monotone between state changes: a success saturates at
    /// the healthy threshold, a failure at the unhealthy threshold, and the
    /// opposite counter resets only when a threshold is crossed. Returns
    /// `true` when the state changed (the caller owes a change-signal
    /// notify). A record in `Terminating` is inert.
    pub fn apply_probe(&mut self, outcome: ProbeOutcome, thresholds: Thresholds) -> bool {
        if self.state == VmState::Terminating {
            return false;
        }

        match outcome {
            ProbeOutcome::Ok => {
                self.n_success_healthchecks =
                    (self.n_success_healthchecks + 1).min(thresholds.healthy);
                if self.n_success_healthchecks >= thresholds.healthy
                    && matches!(
                        self.state,
                        VmState::HealthcheckInitializing | VmState::Unhealthy
                    )
                {
                    self.state = VmState::Healthy;
                    self.n_failed_healthchecks = 0;
                    return true;
                }
            }
            ProbeOutcome::Failed => {
                self.n_failed_healthchecks =
                    (self.n_failed_healthchecks + 1).min(thresholds.unhealthy);
                if self.n_failed_healthchecks >= thresholds.unhealthy
                    && matches!(
                        self.state,
                        VmState::HealthcheckInitializing | VmState::Healthy
                    )
                {
                    self.state = VmState::Unhealthy;
                    self.n_success_healthchecks = 0;
                    return true;
                }
            }
        }

        false
    }
}

#[cfg(test)]
#[path = "vm_tests.rs"]
mod tests;
