// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{wait_until, TestBed};
use crate::worker::CompletionStrategy;
use plural_adapters::FakeRunner;
use plural_core::{IssueRef, IssueSource, Session, SessionState, WorkItemId};

#[test]
fn session_registry_tracks_sessions_and_children() {
    let registry = SessionRegistry::new();
    let parent = SessionState::new(Session::builder().id("p").branch("plural/p").build());
    let child = SessionState::new(
        Session::builder()
            .id("c")
            .branch("plural/p-child-1")
            .supervisor_id("p")
            .build(),
    );

    registry.register(Arc::clone(&parent));
    registry.register(Arc::clone(&child));
    registry.register_child(&parent.id(), &child.id());

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.child_ids_of(&parent.id()), vec![child.id()]);
    assert_eq!(registry.live_children_of(&parent.id()).len(), 1);

    child.mark_completed();
    assert!(registry.live_children_of(&parent.id()).is_empty());

    registry.remove(&parent.id());
    assert!(registry.get(&parent.id()).is_none());
    assert!(registry.child_ids_of(&parent.id()).is_empty());
}

#[test]
fn session_registry_collects_issue_keys() {
    let registry = SessionRegistry::new();
    let issue = IssueRef::new(IssueSource::Github, "42", "t", "u");
    registry.register(SessionState::new(
        Session::builder().id("a").issue(issue.clone()).build(),
    ));
    registry.register(SessionState::new(Session::builder().id("b").build()));

    let keys = registry.issue_keys();
    assert_eq!(keys.len(), 1);
    assert!(keys.contains(&issue.key()));
}

#[tokio::test]
async fn worker_registry_sweeps_completed_item_workers() {
    let bed = TestBed::new();
    let session = bed.session("plural/sweep");
    let (runner, _handle) = FakeRunner::single_turn();
    let worker = SessionWorker::spawn(bed.seed(
        Arc::clone(&session),
        runner,
        "go",
        CompletionStrategy::DaemonManaged,
    ));

    let registry = WorkerRegistry::new();
    registry.register(WorkItemId::new("item-1"), session.id(), worker);

    wait_until(|| session.is_completed()).await;
    wait_until(|| !registry.collect_completed().is_empty() || registry.is_empty()).await;
    assert!(registry.is_empty());
}

#[tokio::test]
async fn worker_registry_drops_child_workers_silently() {
    let bed = TestBed::new();
    let session = bed.session("plural/child-sweep");
    let (runner, _handle) = FakeRunner::single_turn();
    let worker = SessionWorker::spawn(bed.seed(
        Arc::clone(&session),
        runner,
        "go",
        CompletionStrategy::DaemonManaged,
    ));

    let registry = WorkerRegistry::new();
    registry.register_child(session.id(), worker);

    wait_until(|| session.is_completed()).await;

    // Child workers never surface as completed work items
    let mut swept = Vec::new();
    for _ in 0..100 {
        swept = registry.collect_completed();
        if registry.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert!(swept.is_empty());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn cancel_all_and_drain_stop_open_workers() {
    let bed = TestBed::new();
    let session = bed.session("plural/drain");
    // Never completes on its own
    let (runner, _handle) = FakeRunner::new(vec![vec![
        plural_adapters::ResponseChunk::text("stuck"),
    ]]);
    let worker = SessionWorker::spawn(bed.seed(
        Arc::clone(&session),
        runner,
        "go",
        CompletionStrategy::DaemonManaged,
    ));

    let registry = WorkerRegistry::new();
    registry.register(WorkItemId::new("item-1"), session.id(), worker);

    registry.cancel_all();
    registry.drain(std::time::Duration::from_secs(5)).await;
    assert!(registry.is_empty());
}
