// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const THRESHOLDS: Thresholds = Thresholds {
    healthy: 3,
    unhealthy: 2,
};

fn record(state: VmState) -> VmRecord {
    VmRecord {
        id: "ab12cd34".to_string(),
        name: "wso-ab12cd34".to_string(),
        state,
        cpus: 2,
        memory_kib: 2_097_152,
        image_path: PathBuf::from("/img/base.qcow2"),
        network_name: "wso-net".to_string(),
        bridge_name: "wso-virbr".to_string(),
        ip_address: Ipv4Addr::new(192, 168, 100, 17),
        n_success_healthchecks: 0,
        n_failed_healthchecks: 0,
        started_at: None,
    }
}

#[test]
fn initializing_promotes_after_healthy_threshold() {
    let mut vm = record(VmState::HealthcheckInitializing);
    assert!(!vm.apply_probe(ProbeOutcome::Ok, THRESHOLDS));
    assert!(!vm.apply_probe(ProbeOutcome::Ok, THRESHOLDS));
    assert!(vm.apply_probe(ProbeOutcome::Ok, THRESHOLDS));
    assert_eq!(vm.state, VmState::Healthy);
    assert_eq!(vm.n_failed_healthchecks, 0);
}

#[test]
fn promotion_resets_failure_counter() {
    let mut vm = record(VmState::HealthcheckInitializing);
    vm.apply_probe(ProbeOutcome::Failed, THRESHOLDS);
    assert_eq!(vm.n_failed_healthchecks, 1);
    for _ in 0..3 {
        vm.apply_probe(ProbeOutcome::Ok, THRESHOLDS);
    }
    assert_eq!(vm.state, VmState::Healthy);
    assert_eq!(vm.n_failed_healthchecks, 0);
}

#[test]
fn healthy_demotes_after_unhealthy_threshold() {
    let mut vm = record(VmState::Healthy);
    vm.n_success_healthchecks = THRESHOLDS.healthy;
    assert!(!vm.apply_probe(ProbeOutcome::Failed, THRESHOLDS));
    assert_eq!(vm.state, VmState::Healthy);
    assert!(vm.apply_probe(ProbeOutcome::Failed, THRESHOLDS));
    assert_eq!(vm.state, VmState::Unhealthy);
    assert_eq!(vm.n_success_healthchecks, 0);
}

#[test]
fn initializing_demotes_when_guest_never_answers() {
    // A VM whose application port never opens must still be reaped.
    let mut vm = record(VmState::HealthcheckInitializing);
    assert!(!vm.apply_probe(ProbeOutcome::Failed, THRESHOLDS));
    assert!(vm.apply_probe(ProbeOutcome::Failed, THRESHOLDS));
    assert_eq!(vm.state, VmState::Unhealthy);
}

#[test]
fn counters_saturate_at_their_thresholds() {
    let mut vm = record(VmState::Healthy);
    for _ in 0..10 {
        vm.apply_probe(ProbeOutcome::Ok, THRESHOLDS);
    }
    assert_eq!(vm.n_success_healthchecks, THRESHOLDS.healthy);

    let mut vm = record(VmState::Unhealthy);
    for _ in 0..10 {
        vm.apply_probe(ProbeOutcome::Failed, THRESHOLDS);
    }
    assert_eq!(vm.n_failed_healthchecks, THRESHOLDS.unhealthy);
}

#[test]
fn unhealthy_can_recover() {
    let mut vm = record(VmState::Unhealthy);
    vm.n_failed_healthchecks = THRESHOLDS.unhealthy;
    for _ in 0..2 {
        assert!(!vm.apply_probe(ProbeOutcome::Ok, THRESHOLDS));
    }
    assert!(vm.apply_probe(ProbeOutcome::Ok, THRESHOLDS));
    assert_eq!(vm.state, VmState::Healthy);
    assert_eq!(vm.n_failed_healthchecks, 0);
}

#[test]
fn terminating_is_inert() {
    let mut vm = record(VmState::Terminating);
    for _ in 0..5 {
        assert!(!vm.apply_probe(ProbeOutcome::Ok, THRESHOLDS));
        assert!(!vm.apply_probe(ProbeOutcome::Failed, THRESHOLDS));
    }
    assert_eq!(vm.state, VmState::Terminating);
    assert_eq!(vm.n_success_healthchecks, 0);
    assert_eq!(vm.n_failed_healthchecks, 0);
}

#[yare::parameterized(
    launching     = { VmState::Launching, true },
    configuring   = { VmState::Configuring, true },
    initializing  = { VmState::HealthcheckInitializing, true },
    healthy       = { VmState::Healthy, true },
    unhealthy     = { VmState::Unhealthy, false },
    terminating   = { VmState::Terminating, false },
)]
fn running_partition(state: VmState, expected: bool) {
    assert_eq!(state.is_running(), expected);
}

#[test]
fn state_serializes_snake_case() {
    let json = serde_json::to_string(&VmState::HealthcheckInitializing).unwrap();
    assert_eq!(json, "\"healthcheck_initializing\"");
    let back: VmState = serde_json::from_str(&json).unwrap();
    assert_eq!(back, VmState::HealthcheckInitializing);
}
