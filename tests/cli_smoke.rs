use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use pagepilot_cli::AppConfig;
use perceiver_structural::SnapshotConfig;

fn pagepilot() -> Command {
    Command::cargo_bin("pagepilot").expect("binary built")
}

#[test]
fn help_lists_both_commands() {
    let assert = pagepilot().arg("--help").assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 output");
    assert!(stdout.contains("snapshot"));
    assert!(stdout.contains("act"));
}

#[test]
fn malformed_urls_are_rejected_before_launch() {
    let assert = pagepilot()
        .args(["snapshot", "--url", "not a url"])
        .assert()
        .failure();
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).expect("utf8 output");
    assert!(stderr.contains("--url"), "{stderr}");
}

#[test]
fn unknown_actions_are_rejected() {
    pagepilot()
        .args([
            "act",
            "--url",
            "https://example.com/",
            "--index",
            "0",
            "--action",
            "hover",
        ])
        .assert()
        .failure();
}

#[test]
fn missing_explicit_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.yaml");
    pagepilot()
        .arg("--config")
        .arg(&missing)
        .args(["snapshot", "--url", "https://example.com/"])
        .assert()
        .code(1);
}

#[test]
fn shipped_config_matches_defaults() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/pagepilot.yaml");
    let content = std::fs::read_to_string(path).expect("config/pagepilot.yaml");
    let cfg = AppConfig::from_yaml(&content).expect("valid yaml");

    assert_eq!(cfg.snapshot, SnapshotConfig::default());
    assert_eq!(cfg.action, Default::default());
    assert_eq!(cfg.logging, Default::default());
}
