//! CLI Integration Tests
//!
//! Runs the built `rpcbalancer` binary and checks argument handling and
//! startup failures. None of these tests bind a port.

use std::process::{Command, Output};

fn rpcbalancer(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rpcbalancer"))
        .args(args)
        .env_remove("RPCBALANCER_URL_KEY")
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run rpcbalancer")
}

#[test]
fn test_help_lists_options() {
    let output = rpcbalancer(&["--help"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in [
        "--rpc-port",
        "--metrics-port",
        "--fallback",
        "--selection-method",
        "--health-check-interval",
        "--max-body-size",
        "--node",
        "--url-key",
        "--log-level",
    ] {
        assert!(stdout.contains(flag), "help is missing {}", flag);
    }
}

#[test]
fn test_unknown_selection_method_fails() {
    let output = rpcbalancer(&["--selection-method", "weighted", "--node", "http://127.0.0.1:8545"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("weighted"));
}

#[test]
fn test_missing_nodes_fails() {
    let output = rpcbalancer(&[]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("at least one node"));
}

#[test]
fn test_node_without_scheme_fails() {
    let output = rpcbalancer(&["--node", "127.0.0.1:8545"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("http://"));
}
