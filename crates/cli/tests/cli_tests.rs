//! CLI integration tests

use std::process::Command;

fn migctl() -> Command {
    Command::new(env!("CARGO_BIN_EXE_migctl"))
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = migctl()
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("container migration server"), "Should show about text");
    assert!(stdout.contains("predict"), "Should show predict command");
    assert!(stdout.contains("containers"), "Should show containers command");
    assert!(stdout.contains("system"), "Should show system command");
    assert!(stdout.contains("health"), "Should show health command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = migctl()
        .arg("--version")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("migctl"), "Should show binary name");
}

#[test]
fn test_predict_help_lists_fields() {
    let output = migctl()
        .args(["predict", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--cpu"));
    assert!(stdout.contains("--memory"));
    assert!(stdout.contains("--source-host"));
    assert!(stdout.contains("--timestamp"));
}

#[test]
fn test_invalid_format_is_rejected() {
    let output = migctl()
        .args(["--format", "yaml", "system"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("yaml"));
}

#[test]
fn test_unreachable_server_fails_cleanly() {
    // Port 1 is reserved and never has a prediction server behind it
    let output = migctl()
        .args([
            "--server",
            "127.0.0.1:1",
            "predict",
            "web-1",
            "--cpu",
            "0.9",
            "--memory",
            "0.2",
            "--source-host",
            "node-a",
            "--timeout",
            "2",
        ])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("127.0.0.1:1"));
}
