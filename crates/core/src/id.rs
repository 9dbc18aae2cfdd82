// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! VM identifier generation.

/// Prefix for every hypervisor object this daemon creates.
pub const NAME_PREFIX: &str = "wso-";

/// Generate an 8-character opaque VM id.
///
/// Drawn from a v4 UUID, so ids are unique for the daemon's lifetime
/// without any coordination.
pub fn new_vm_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

/// Domain name presented to the hypervisor for a VM id.
pub fn domain_name(id: &str) -> String {
    format!("{NAME_PREFIX}{id}")
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
