// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for daemon tests.

use crate::ctx::Ctx;
use crate::env::Settings;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use wso_adapters::{FakeConfigurer, FakeHypervisor, FakeProvisioner};
use wso_core::{VmRecord, VmState};

/// Daemon context wired to fake adapters.
pub type TestCtx = Ctx<FakeHypervisor, FakeProvisioner, FakeConfigurer>;

/// Settings with timings tightened so state machines run in milliseconds.
pub fn test_settings() -> Settings {
    let mut settings = Settings::from_lookup(|var| match var {
        "IMAGE_PATH" => Some("/img/base.qcow2".to_string()),
        "WORKDIR" => Some("/tmp/wso-test".to_string()),
        _ => None,
    })
    .expect("test settings");
    settings.healthcheck_start_delay = Duration::ZERO;
    settings.healthcheck_interval = Duration::from_millis(20);
    settings.healthcheck_healthy_threshold = 2;
    settings.healthcheck_unhealthy_threshold = 2;
    settings.configuration_initial_delay = Duration::ZERO;
    settings.configuration_retry_interval = Duration::from_millis(5);
    settings.configuration_retries = 3;
    settings
}

pub fn test_ctx(settings: Settings) -> Arc<TestCtx> {
    Arc::new(Ctx::new(
        settings,
        FakeHypervisor::new(),
        FakeProvisioner::new(),
        FakeConfigurer::new(),
    ))
}

/// A record as the reconciler would mint it, with a fixed name.
pub fn record(name: &str, state: VmState, ip: Ipv4Addr) -> VmRecord {
    VmRecord {
        id: name.trim_start_matches("wso-").to_string(),
        name: name.to_string(),
        state,
        cpus: 2,
        memory_kib: 2_097_152,
        image_path: PathBuf::from("/img/base.qcow2"),
        network_name: "wso-net".to_string(),
        bridge_name: "wso-virbr".to_string(),
        ip_address: ip,
        n_success_healthchecks: 0,
        n_failed_healthchecks: 0,
        started_at: None,
    }
}

/// Poll until `predicate` holds or the deadline passes; returns the final
/// predicate value.
pub async fn wait_until(deadline: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    predicate()
}
