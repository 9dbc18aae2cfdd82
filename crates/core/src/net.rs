// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared NAT network constants and static IP allocation.
//!
//! All VMs share one NAT network (`wso-net` on bridge `wso-virbr`) and
//! receive a static address from `192.168.100.0/24` at creation time.

use rand::Rng;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Name of the shared NAT network.
pub const NETWORK_NAME: &str = "wso-net";

/// Host bridge device backing the NAT network. Must fit [`IFNAME_MAX`].
pub const BRIDGE_NAME: &str = "wso-virbr";

/// Gateway address of the NAT subnet.
pub const GATEWAY: Ipv4Addr = Ipv4Addr::new(192, 168, 100, 1);

/// Prefix length of the NAT subnet.
pub const PREFIX_LEN: u8 = 24;

/// First assignable host suffix (`.1` is the gateway).
pub const SUFFIX_MIN: u8 = 2;

/// Last assignable host suffix.
pub const SUFFIX_MAX: u8 = 254;

/// Kernel limit on network interface names (IFNAMSIZ minus the NUL).
pub const IFNAME_MAX: usize = 15;

/// Random draws attempted before falling back to a linear scan.
const MAX_DRAWS: usize = 64;

/// Network-level allocation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NetError {
    #[error("address pool 192.168.100.2-192.168.100.254 exhausted")]
    PoolExhausted,

    #[error("bridge name {0:?} is longer than 15 characters")]
    BridgeNameTooLong(String),
}

/// Address of host `suffix` in the NAT subnet.
pub fn host_ip(suffix: u8) -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 100, suffix)
}

/// Pick a free static address for a new VM.
///
/// Draws uniformly from the suffix pool and rejects addresses already in
/// use. A dense fleet makes random draws collide repeatedly, so after a
/// bounded number of draws this scans for the smallest free suffix instead.
pub fn allocate_ip<R: Rng + ?Sized>(
    occupied: &HashSet<Ipv4Addr>,
    rng: &mut R,
) -> Result<Ipv4Addr, NetError> {
    for _ in 0..MAX_DRAWS {
        let candidate = host_ip(rng.random_range(SUFFIX_MIN..=SUFFIX_MAX));
        if !occupied.contains(&candidate) {
            return Ok(candidate);
        }
    }

    (SUFFIX_MIN..=SUFFIX_MAX)
        .map(host_ip)
        .find(|ip| !occupied.contains(ip))
        .ok_or(NetError::PoolExhausted)
}

/// Reject bridge device names the OS cannot represent.
///
/// Checked before any hypervisor call so a misconfigured bridge name fails
/// fast instead of surfacing as an opaque driver error.
pub fn validate_bridge_name(name: &str) -> Result<(), NetError> {
    if name.len() > IFNAME_MAX {
        return Err(NetError::BridgeNameTooLong(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
#[path = "net_tests.rs"]
mod tests;
