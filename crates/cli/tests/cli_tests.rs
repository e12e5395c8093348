//! CLI integration tests

use std::process::Command;

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = Command::new("cargo")
        .args(["run", "-p", "warden-cli", "--", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(
        stdout.contains("Runtime Warden"),
        "Should show app name"
    );
    assert!(stdout.contains("limits"), "Should show limits command");
    assert!(stdout.contains("runtimes"), "Should show runtimes command");
    assert!(stdout.contains("report"), "Should show report command");
    assert!(stdout.contains("push"), "Should show push command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = Command::new("cargo")
        .args(["run", "-p", "warden-cli", "--", "--version"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("wardenctl"), "Should show binary name");
}

/// Test report subcommand help
#[test]
fn test_report_help() {
    let output = Command::new("cargo")
        .args(["run", "-p", "warden-cli", "--", "report", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Report help should succeed");
    assert!(stdout.contains("--cluster"), "Should show cluster option");
    assert!(stdout.contains("--owner"), "Should show owner option");
}

/// Test push subcommand help
#[test]
fn test_push_help() {
    let output = Command::new("cargo")
        .args(["run", "-p", "warden-cli", "--", "push", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Push help should succeed");
    assert!(stdout.contains("settings"), "Should show settings subcommand");
    assert!(stdout.contains("override"), "Should show override subcommand");
}
