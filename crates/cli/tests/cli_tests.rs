//! CLI integration tests

use std::process::Command;

fn dw_loadtest() -> Command {
    Command::new(env!("CARGO_BIN_EXE_dw-loadtest"))
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = dw_loadtest()
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("DevWorkspace"), "Should describe the tool");
    assert!(stdout.contains("run"), "Should show run command");
    assert!(stdout.contains("stages"), "Should show stages command");
    assert!(stdout.contains("cleanup"), "Should show cleanup command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = dw_loadtest()
        .arg("--version")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("dw-loadtest"), "Should show binary name");
}

/// Test run subcommand help
#[test]
fn test_run_help() {
    let output = dw_loadtest()
        .args(["run", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Run help should succeed");
    assert!(stdout.contains("--report"), "Should show report option");
    assert!(stdout.contains("--metrics-port"), "Should show metrics port option");
}

/// Test that the stages table follows the standard profile
#[test]
fn test_stages_json() {
    let output = dw_loadtest()
        .args(["stages", "--duration-minutes", "25", "--max-vus", "50", "--format", "json"])
        .env_remove("TEST_DURATION_IN_MINUTES")
        .env_remove("MAX_VUS")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success(), "Stages should succeed");

    let stages: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("Stages output should be JSON");
    let targets: Vec<u64> = stages
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["target"].as_u64().unwrap())
        .collect();
    assert_eq!(targets, vec![12, 25, 37, 50, 25, 0]);
}

/// Test that stages read their inputs from the environment
#[test]
fn test_stages_from_env() {
    let output = dw_loadtest()
        .args(["stages", "--format", "json"])
        .env("TEST_DURATION_IN_MINUTES", "10")
        .env("MAX_VUS", "4")
        .output()
        .expect("Failed to execute command");

    let stages: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let minutes: Vec<u64> = stages
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["duration_minutes"].as_u64().unwrap())
        .collect();
    assert_eq!(minutes, vec![3, 3, 2, 2, 1, 1]);
}

/// Test that missing connection settings abort before any load is generated
#[test]
fn test_run_without_endpoint_fails() {
    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("report.json");

    let output = dw_loadtest()
        .args(["run", "--report"])
        .arg(&report)
        .env_remove("KUBE_API")
        .env_remove("KUBE_TOKEN")
        .env_remove("IN_CLUSTER")
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(1));
    assert!(!report.exists(), "No report should be written");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("KUBE_API"), "Should name the missing variable");
}
