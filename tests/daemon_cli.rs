// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Black-box checks of the plurald binary: flag handling and a single
//! `--once` cycle against an empty scope.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use assert_cmd::Command;

fn plurald() -> Command {
    Command::cargo_bin("plurald").unwrap()
}

#[test]
fn help_lists_recognised_options() {
    let output = plurald().arg("--help").assert().success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).to_string();
    assert!(stdout.contains("Usage: plurald"));
    assert!(stdout.contains("--max-concurrent"));
    assert!(stdout.contains("--merge-method"));
    assert!(stdout.contains("--review-poll-interval"));
}

#[test]
fn version_prints_package_version() {
    let output = plurald().arg("--version").assert().success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).to_string();
    assert!(stdout.starts_with("plurald "));
}

#[test]
fn unknown_flag_fails_with_usage() {
    let output = plurald().arg("--frobnicate").assert().failure().code(2);
    let stderr = String::from_utf8_lossy(&output.get_output().stderr).to_string();
    assert!(stderr.contains("unknown flag: --frobnicate"));
    assert!(stderr.contains("Usage: plurald"));
}

#[test]
fn missing_flag_value_fails() {
    plurald().arg("--repo").assert().failure().code(2);
}

#[test]
fn once_mode_runs_a_tick_and_exits() {
    let state = tempfile::tempdir().unwrap();
    let repo = tempfile::tempdir().unwrap();

    // An empty non-git scope: no provider is configured, so the tick polls
    // nothing, persists state and exits cleanly.
    plurald()
        .arg("--once")
        .arg("--repo")
        .arg(repo.path())
        .env("PLURAL_STATE_DIR", state.path())
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success();

    // State file persisted, lock released
    let entries: Vec<String> = std::fs::read_dir(state.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert!(entries.iter().any(|name| name.ends_with(".json")));
    assert!(!entries.iter().any(|name| name.ends_with(".lock")));
}
