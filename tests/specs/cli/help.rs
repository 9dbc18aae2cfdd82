//! CLI help output specs

use crate::prelude::*;

#[test]
fn no_args_shows_usage_and_fails() {
    let env = SpecEnv::new();
    let output = env.wso(&[]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Usage:"), "got: {}", stderr(&output));
}

#[test]
fn help_lists_all_subcommands() {
    let env = SpecEnv::new();
    let output = env.wso(&["--help"]);
    assert!(output.status.success());
    let text = stdout(&output);
    for subcommand in ["start", "stop", "state", "scale"] {
        assert!(text.contains(subcommand), "missing {subcommand} in: {text}");
    }
}

#[test]
fn version_shows_version() {
    let env = SpecEnv::new();
    let output = env.wso(&["--version"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("0.1"));
}
