//! CLI error-path specs: no daemon is running in any of these.

use crate::prelude::*;

#[test]
fn state_without_a_daemon_fails() {
    let env = SpecEnv::new();
    let output = env.wso(&["state"]);
    assert!(!output.status.success());
    assert!(
        stderr(&output).contains("daemon not running"),
        "got: {}",
        stderr(&output)
    );
}

#[test]
fn scale_without_a_daemon_fails() {
    let env = SpecEnv::new();
    let output = env.wso(&["scale", "3"]);
    assert!(!output.status.success());
    assert!(
        stderr(&output).contains("daemon not running"),
        "got: {}",
        stderr(&output)
    );
}

#[test]
fn scale_requires_a_number() {
    let env = SpecEnv::new();
    let output = env.wso(&["scale"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Usage:"), "got: {}", stderr(&output));

    let output = env.wso(&["scale", "many"]);
    assert!(!output.status.success());
}

#[test]
fn stop_without_a_pid_file_fails() {
    let env = SpecEnv::new();
    let output = env.wso(&["stop"]);
    assert!(!output.status.success());
    assert!(
        stderr(&output).contains("no PID file"),
        "got: {}",
        stderr(&output)
    );
}

#[test]
fn unknown_subcommands_are_rejected() {
    let env = SpecEnv::new();
    let output = env.wso(&["frobnicate"]);
    assert!(!output.status.success());
}
