// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON view of the fleet for the `state` command.

use serde_json::{json, Map, Value};
use wso_core::VmRecord;

/// Wire shape of the `state` response: one object keyed by hypervisor
/// URL, with `domains` keyed by domain name.
pub fn state_json(hypervisor_url: &str, snapshot: &[VmRecord]) -> Value {
    let mut vms: Vec<&VmRecord> = snapshot.iter().collect();
    vms.sort_by(|a, b| a.name.cmp(&b.name));

    let mut domains = Map::new();
    for vm in vms {
        domains.insert(
            vm.name.clone(),
            serde_json::to_value(vm).unwrap_or(Value::Null),
        );
    }

    json!({ hypervisor_url: { "domains": domains } })
}

#[cfg(test)]
#[path = "state_view_tests.rs"]
mod tests;
