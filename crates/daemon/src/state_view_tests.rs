// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::record;
use wso_core::{host_ip, VmState};

#[test]
fn empty_fleet_yields_an_empty_domains_object() {
    let value = state_json("qemu:///system", &[]);
    assert_eq!(value["qemu:///system"]["domains"], serde_json::json!({}));
}

#[test]
fn records_are_keyed_by_domain_name() {
    let mut healthy = record("wso-bbbb0001", VmState::Healthy, host_ip(3));
    healthy.started_at = Some(1_700_000_000);
    healthy.n_success_healthchecks = 3;
    let snapshot = vec![
        record("wso-aaaa0001", VmState::Launching, host_ip(2)),
        healthy,
    ];

    let value = state_json("qemu:///system", &snapshot);
    let domains = &value["qemu:///system"]["domains"];

    let launching = &domains["wso-aaaa0001"];
    assert_eq!(launching["state"], "launching");
    assert_eq!(launching["ip_address"], "192.168.100.2");
    assert_eq!(launching["started_at"], serde_json::Value::Null);

    let healthy = &domains["wso-bbbb0001"];
    assert_eq!(healthy["state"], "healthy");
    assert_eq!(healthy["n_success_healthchecks"], 3);
    assert_eq!(healthy["started_at"], 1_700_000_000);
    assert_eq!(healthy["network_name"], "wso-net");
    assert_eq!(healthy["bridge_name"], "wso-virbr");
    assert_eq!(healthy["cpus"], 2);
    assert_eq!(healthy["memory_kib"], 2_097_152);
}

#[test]
fn output_round_trips_through_serde() {
    let snapshot = vec![record("wso-aaaa0001", VmState::Healthy, host_ip(8))];
    let value = state_json("qemu:///system", &snapshot);
    let text = serde_json::to_string_pretty(&value).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed, value);
}
