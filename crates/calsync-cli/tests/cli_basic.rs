//! End-to-end smoke tests against the built binary.

use std::process::Command;

/// Run the binary with an isolated home directory so tests never touch
/// the real configuration or database.
fn run_isolated(home: &std::path::Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_calsync"))
        .env("HOME", home)
        .env("CALSYNC_ENV", "dev")
        .args(args)
        .output()
        .expect("failed to execute calsync");
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.code().unwrap_or(-1),
    )
}

#[test]
fn help_lists_subcommands() {
    let output = Command::new(env!("CARGO_BIN_EXE_calsync"))
        .arg("--help")
        .output()
        .expect("failed to execute calsync");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for subcommand in ["account", "sync", "agenda", "event", "status"] {
        assert!(stdout.contains(subcommand), "help missing {subcommand}");
    }
}

#[test]
fn unknown_subcommand_fails() {
    let output = Command::new(env!("CARGO_BIN_EXE_calsync"))
        .arg("frobnicate")
        .output()
        .expect("failed to execute calsync");
    assert!(!output.status.success());
}

#[test]
fn first_run_bootstraps_local_account() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, stderr, code) = run_isolated(home.path(), &["status", "--json"]);
    assert_eq!(code, 0, "status failed: {stderr}");

    let summary: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let accounts = summary["accounts"].as_array().unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0]["type"], "local");
    assert_eq!(accounts[0]["calendars"], 1);
    assert_eq!(summary["today"], 0);
}

#[test]
fn event_add_then_agenda_round_trip() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_isolated(
        home.path(),
        &[
            "event", "add", "--title", "Standup", "--start", "2024-06-10T09:00:00Z", "--end",
            "2024-06-10T09:15:00Z",
        ],
    );
    assert_eq!(code, 0, "event add failed: {stderr}");

    let (stdout, _, code) = run_isolated(home.path(), &["agenda", "--date", "2024-06-10"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Standup"));

    let (stdout, _, code) = run_isolated(home.path(), &["agenda", "--date", "2024-06-11"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("no events"));
}
