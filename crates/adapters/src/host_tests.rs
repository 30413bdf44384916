// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tokio::sync::mpsc;

async fn stream_of(events: Vec<StreamEvent>) -> EventStream {
    let (tx, rx) = mpsc::channel(16);
    for event in events {
        tx.send(event).await.unwrap();
    }
    rx
}

#[tokio::test]
async fn drain_collects_lines_until_done() {
    let rx = stream_of(vec![
        StreamEvent::line("Creating pull request"),
        StreamEvent::line("https://example.test/pr/12"),
        StreamEvent::done(),
    ])
    .await;

    let lines = drain_stream(rx).await.unwrap();
    assert_eq!(
        lines,
        vec!["Creating pull request", "https://example.test/pr/12"]
    );
}

#[tokio::test]
async fn drain_splits_multi_line_events() {
    let rx = stream_of(vec![
        StreamEvent::line("one\ntwo"),
        StreamEvent::done(),
    ])
    .await;

    let lines = drain_stream(rx).await.unwrap();
    assert_eq!(lines, vec!["one", "two"]);
}

#[tokio::test]
async fn drain_surfaces_stream_error() {
    let rx = stream_of(vec![
        StreamEvent::line("pushing"),
        StreamEvent::failed("remote rejected"),
    ])
    .await;

    let err = drain_stream(rx).await.unwrap_err();
    assert!(matches!(err, HostError::Stream(msg) if msg == "remote rejected"));
}

#[tokio::test]
async fn drain_rejects_truncated_stream() {
    let rx = stream_of(vec![StreamEvent::line("partial")]).await;
    let err = drain_stream(rx).await.unwrap_err();
    assert!(matches!(err, HostError::StreamTruncated));
}

#[test]
fn last_url_line_finds_trailing_url() {
    let lines = vec![
        "Warning: something".to_string(),
        "https://example.test/pr/1".to_string(),
        "Done.".to_string(),
        "  https://example.test/pr/2  ".to_string(),
    ];
    assert_eq!(
        last_url_line(&lines).as_deref(),
        Some("https://example.test/pr/2")
    );
}

#[test]
fn last_url_line_none_without_urls() {
    let lines = vec!["no links here".to_string()];
    assert!(last_url_line(&lines).is_none());
}

#[test]
fn host_enums_serde_snake_case() {
    assert_eq!(
        serde_json::to_string(&ReviewDecision::ChangesRequested).unwrap(),
        "\"changes_requested\""
    );
    assert_eq!(serde_json::to_string(&CiStatus::None).unwrap(), "\"none\"");
    assert_eq!(
        serde_json::to_string(&PrState::NotFound).unwrap(),
        "\"not_found\""
    );
}
