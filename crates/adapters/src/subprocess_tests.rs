// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn run_bounded_captures_output() {
    let mut cmd = Command::new("echo");
    cmd.arg("hello");
    let output = run_bounded(cmd, Duration::from_secs(5), "echo")
        .await
        .unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
}

#[tokio::test]
async fn run_bounded_returns_nonzero_output() {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", "exit 7"]);
    // run_bounded reports the exit status, it does not judge it
    let output = run_bounded(cmd, Duration::from_secs(5), "exit probe")
        .await
        .unwrap();
    assert_eq!(output.status.code(), Some(7));
}

#[tokio::test]
async fn run_bounded_expires() {
    let mut cmd = Command::new("sleep");
    cmd.arg("5");
    let err = run_bounded(cmd, Duration::from_millis(50), "sleep probe")
        .await
        .unwrap_err();
    assert!(matches!(err, ExecError::DeadlineExpired { command, .. } if command == "sleep probe"));
    assert!(err.to_string().contains("did not finish"));
}

#[tokio::test]
async fn run_bounded_reports_unstartable_command() {
    let cmd = Command::new("/does/not/exist-plural");
    let err = run_bounded(cmd, Duration::from_secs(5), "missing binary")
        .await
        .unwrap_err();
    assert!(matches!(err, ExecError::NotStarted { .. }));
}

#[tokio::test]
async fn run_checked_trims_stdout() {
    let mut cmd = Command::new("echo");
    cmd.arg("  spaced  ");
    let out = run_checked(cmd, Duration::from_secs(5), "echo").await.unwrap();
    assert_eq!(out, "spaced");
}

#[tokio::test]
async fn run_checked_surfaces_stderr_on_failure() {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", "echo boom >&2; exit 3"]);
    let err = run_checked(cmd, Duration::from_secs(5), "failing command")
        .await
        .unwrap_err();
    match err {
        ExecError::Failed { command, stderr } => {
            assert_eq!(command, "failing command");
            assert_eq!(stderr, "boom");
        }
        other => panic!("expected Failed, got {other:?}"),
    }
}
