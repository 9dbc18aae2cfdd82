// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{record, test_ctx, test_settings, wait_until};
use std::collections::HashSet;
use std::time::Duration;
use wso_core::host_ip;

const DEADLINE: Duration = Duration::from_secs(5);

fn rng() -> StdRng {
    StdRng::seed_from_u64(7)
}

#[tokio::test]
async fn scale_up_creates_the_deficit_with_distinct_addresses() {
    let ctx = test_ctx(test_settings());
    ctx.desired.store(3, Ordering::SeqCst);

    reconcile_once(&ctx, &mut rng());

    let snapshot = ctx.fleet.snapshot();
    assert_eq!(snapshot.len(), 3);
    assert!(snapshot.iter().all(|vm| vm.state == VmState::Launching));

    let ips: HashSet<_> = snapshot.iter().map(|vm| vm.ip_address).collect();
    assert_eq!(ips.len(), 3, "addresses must be pairwise distinct");
    let names: HashSet<_> = snapshot.iter().map(|vm| vm.name.clone()).collect();
    assert_eq!(names.len(), 3);

    // Launch workers drive every record through domain creation.
    assert!(wait_until(DEADLINE, || ctx.hypervisor.domains().len() == 3).await);
}

#[tokio::test]
async fn converging_fleet_is_not_double_spawned() {
    let ctx = test_ctx(test_settings());
    ctx.desired.store(3, Ordering::SeqCst);

    let mut rng = rng();
    reconcile_once(&ctx, &mut rng);
    // Launching records count as running: a second pass adds nothing.
    reconcile_once(&ctx, &mut rng);

    assert_eq!(ctx.fleet.len(), 3);
    assert!(wait_until(DEADLINE, || ctx.hypervisor.domains().len() == 3).await);
    assert_eq!(ctx.hypervisor.domains().len(), 3);
}

#[tokio::test]
async fn raising_desired_mid_convergence_tops_up_only_the_difference() {
    let ctx = test_ctx(test_settings());
    let mut rng = rng();

    ctx.desired.store(3, Ordering::SeqCst);
    reconcile_once(&ctx, &mut rng);

    ctx.desired.store(5, Ordering::SeqCst);
    reconcile_once(&ctx, &mut rng);

    assert_eq!(ctx.fleet.len(), 5);
    assert!(wait_until(DEADLINE, || ctx.hypervisor.domains().len() == 5).await);
}

#[tokio::test]
async fn unhealthy_record_is_reaped_and_replaced() {
    let ctx = test_ctx(test_settings());
    ctx.desired.store(1, Ordering::SeqCst);
    ctx.fleet
        .insert(record("wso-sick0001", VmState::Unhealthy, host_ip(9)))
        .unwrap();
    ctx.hypervisor
        .create_domain("<domain><name>wso-sick0001</name></domain>")
        .await
        .unwrap();

    reconcile_once(&ctx, &mut rng());

    // The sick record is terminating and a replacement is launching.
    assert!(
        wait_until(DEADLINE, || ctx.fleet.get("wso-sick0001").is_none()).await,
        "unhealthy record should be destroyed"
    );
    assert!(
        wait_until(DEADLINE, || {
            let snapshot = ctx.fleet.snapshot();
            snapshot.len() == 1 && snapshot[0].state.is_running()
        })
        .await
    );
    assert!(!ctx.hypervisor.domains().contains("wso-sick0001"));
}

#[tokio::test]
async fn excess_healthy_records_are_trimmed() {
    let ctx = test_ctx(test_settings());
    ctx.desired.store(1, Ordering::SeqCst);
    for (i, suffix) in [2u8, 3, 4].iter().enumerate() {
        let name = format!("wso-heal000{i}");
        ctx.fleet
            .insert(record(&name, VmState::Healthy, host_ip(*suffix)))
            .unwrap();
        ctx.hypervisor
            .create_domain(&format!("<domain><name>{name}</name></domain>"))
            .await
            .unwrap();
    }

    reconcile_once(&ctx, &mut rng());

    // Exactly two victims enter Terminating synchronously.
    let terminating = ctx
        .fleet
        .snapshot()
        .iter()
        .filter(|vm| vm.state == VmState::Terminating)
        .count();
    assert_eq!(terminating, 2);

    assert!(wait_until(DEADLINE, || ctx.fleet.len() == 1).await);
    let survivor = &ctx.fleet.snapshot()[0];
    assert_eq!(survivor.state, VmState::Healthy);
    assert_eq!(ctx.hypervisor.domains().len(), 1);
}

#[tokio::test]
async fn stuck_terminating_record_is_retried() {
    let ctx = test_ctx(test_settings());
    ctx.desired.store(0, Ordering::SeqCst);
    ctx.fleet
        .insert(record("wso-stuck001", VmState::Unhealthy, host_ip(5)))
        .unwrap();
    ctx.hypervisor
        .create_domain("<domain><name>wso-stuck001</name></domain>")
        .await
        .unwrap();
    ctx.hypervisor.fail_destroy("wso-stuck001");

    let mut rng = rng();
    reconcile_once(&ctx, &mut rng);
    assert!(
        wait_until(DEADLINE, || {
            ctx.fleet
                .get("wso-stuck001")
                .is_some_and(|vm| vm.state == VmState::Terminating)
        })
        .await
    );

    // The destroy failed; the record is still there. Once the driver
    // recovers, a later pass retries the destroy. Keep reconciling until
    // the retry lands (the first destroy task must release its claim).
    ctx.hypervisor.clear_fail_destroy("wso-stuck001");
    assert!(
        wait_until(DEADLINE, || {
            reconcile_once(&ctx, &mut rng);
            ctx.fleet.is_empty()
        })
        .await
    );
}

#[test]
fn fresh_records_are_launching_with_fleet_parameters() {
    let settings = test_settings();
    let vm = fresh_record(&settings, host_ip(42));
    assert_eq!(vm.state, VmState::Launching);
    assert_eq!(vm.name, format!("wso-{}", vm.id));
    assert_eq!(vm.id.len(), 8);
    assert_eq!(vm.cpus, settings.vm_cpus);
    assert_eq!(vm.memory_kib, settings.vm_memory_kib);
    assert_eq!(vm.image_path, settings.image_path);
    assert_eq!(vm.network_name, "wso-net");
    assert_eq!(vm.bridge_name, "wso-virbr");
    assert_eq!(vm.ip_address, host_ip(42));
    assert!(vm.started_at.is_none());
}
