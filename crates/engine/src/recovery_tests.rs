// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use plural_adapters::FakeHost;
use plural_core::{FakeClock, IssueRef, IssueSource, WorkItem, WorkItemId};
use yare::parameterized;

fn store_with(
    clock: &FakeClock,
    id: &str,
    state: WorkItemState,
    branch: Option<&str>,
) -> (WorkItemStore, WorkItemId) {
    let store = WorkItemStore::new();
    let mut builder = WorkItem::builder()
        .issue(IssueRef::new(
            IssueSource::Github,
            id,
            format!("issue {id}"),
            "u",
        ))
        .repo_path("/repos/app")
        .state(state)
        .session_id(format!("sess-{id}"));
    if let Some(branch) = branch {
        builder = builder.branch(branch);
    }
    let item = builder.build(clock);
    let item_id = item.id.clone();
    store.insert(item).unwrap();
    (store, item_id)
}

#[tokio::test]
async fn coding_with_open_pr_resumes_at_review() {
    let clock = FakeClock::new();
    let host = FakeHost::new();
    let (store, id) = store_with(&clock, "1", WorkItemState::Coding, Some("plural/issue-1"));
    host.set_pr_state("plural/issue-1", PrState::Open);

    recover(&store, &host, &clock).await;

    assert_eq!(store.get(&id).unwrap().state, WorkItemState::AwaitingReview);
}

#[tokio::test]
async fn pr_created_with_open_pr_resumes_at_review() {
    let clock = FakeClock::new();
    let host = FakeHost::new();
    let (store, id) = store_with(&clock, "1", WorkItemState::PrCreated, Some("plural/issue-1"));
    host.set_pr_state("plural/issue-1", PrState::Open);

    recover(&store, &host, &clock).await;

    assert_eq!(store.get(&id).unwrap().state, WorkItemState::AwaitingReview);
}

#[tokio::test]
async fn coding_with_merged_pr_completes() {
    let clock = FakeClock::new();
    let host = FakeHost::new();
    let (store, id) = store_with(&clock, "2", WorkItemState::Coding, Some("plural/issue-2"));
    host.set_pr_state("plural/issue-2", PrState::Merged);

    recover(&store, &host, &clock).await;

    let item = store.get(&id).unwrap();
    assert_eq!(item.state, WorkItemState::Completed);
    assert!(item.completed_at.is_some());
}

#[tokio::test]
async fn coding_with_closed_pr_is_abandoned() {
    let clock = FakeClock::new();
    let host = FakeHost::new();
    let (store, id) = store_with(&clock, "3", WorkItemState::Coding, Some("plural/issue-3"));
    host.set_pr_state("plural/issue-3", PrState::Closed);

    recover(&store, &host, &clock).await;

    assert_eq!(store.get(&id).unwrap().state, WorkItemState::Abandoned);
}

#[tokio::test]
async fn coding_without_pr_but_branch_on_disk_is_session_lost() {
    let clock = FakeClock::new();
    let host = FakeHost::new();
    let (store, id) = store_with(&clock, "4", WorkItemState::Coding, Some("plural/issue-4"));
    host.add_branch("plural/issue-4");

    recover(&store, &host, &clock).await;

    let item = store.get(&id).unwrap();
    assert_eq!(item.state, WorkItemState::Failed);
    assert_eq!(
        item.error_message.as_deref(),
        Some("session lost during recovery")
    );
}

#[tokio::test]
async fn coding_with_nothing_on_disk_requeues_cleanly() {
    let clock = FakeClock::new();
    let host = FakeHost::new();
    let (store, id) = store_with(&clock, "5", WorkItemState::Coding, Some("plural/issue-5"));

    recover(&store, &host, &clock).await;

    let item = store.get(&id).unwrap();
    assert_eq!(item.state, WorkItemState::Queued);
    assert!(item.session_id.is_none());
    assert!(item.branch.is_none());
}

#[parameterized(
    addressing_feedback = { WorkItemState::AddressingFeedback },
    pushing = { WorkItemState::Pushing },
)]
fn interrupted_rounds_return_to_review(state: WorkItemState) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    rt.block_on(async {
        let clock = FakeClock::new();
        let host = FakeHost::new();
        let (store, id) = store_with(&clock, "6", state, Some("plural/issue-6"));

        recover(&store, &host, &clock).await;

        assert_eq!(store.get(&id).unwrap().state, WorkItemState::AwaitingReview);
    });
}

#[tokio::test]
async fn merging_confirmed_merged_completes() {
    let clock = FakeClock::new();
    let host = FakeHost::new();
    let (store, id) = store_with(&clock, "7", WorkItemState::Merging, Some("plural/issue-7"));
    host.set_pr_state("plural/issue-7", PrState::Merged);

    recover(&store, &host, &clock).await;

    assert_eq!(store.get(&id).unwrap().state, WorkItemState::Completed);
}

#[tokio::test]
async fn merging_unconfirmed_falls_back_to_ci() {
    let clock = FakeClock::new();
    let host = FakeHost::new();
    // PR probe reports open: the merge never landed
    let (store, id) = store_with(&clock, "8", WorkItemState::Merging, Some("plural/issue-8"));
    host.set_pr_state("plural/issue-8", PrState::Open);

    recover(&store, &host, &clock).await;

    assert_eq!(store.get(&id).unwrap().state, WorkItemState::AwaitingCi);
}

#[tokio::test]
async fn stable_states_are_left_alone() {
    let clock = FakeClock::new();
    let host = FakeHost::new();
    let store = WorkItemStore::new();
    for (id, state) in [
        ("10", WorkItemState::Queued),
        ("11", WorkItemState::AwaitingReview),
        ("12", WorkItemState::AwaitingCi),
        ("13", WorkItemState::Completed),
        ("14", WorkItemState::Failed),
    ] {
        store
            .insert(
                WorkItem::builder()
                    .issue(IssueRef::new(IssueSource::Github, id, "t", "u"))
                    .repo_path("/repos/app")
                    .state(state)
                    .build(&clock),
            )
            .unwrap();
    }
    let before: Vec<_> = store.items();

    recover(&store, &host, &clock).await;

    let mut before_sorted = before;
    before_sorted.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
    let mut after = store.items();
    after.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
    assert_eq!(before_sorted, after);
}

#[tokio::test]
async fn recovery_is_idempotent() {
    let clock = FakeClock::new();
    let host = FakeHost::new();
    let store = WorkItemStore::new();
    for (id, state, branch, pr) in [
        ("1", WorkItemState::Coding, Some("plural/issue-1"), Some(PrState::Open)),
        ("2", WorkItemState::Coding, Some("plural/issue-2"), Some(PrState::Merged)),
        ("3", WorkItemState::Pushing, Some("plural/issue-3"), None),
        ("4", WorkItemState::Merging, Some("plural/issue-4"), Some(PrState::Open)),
        ("5", WorkItemState::Queued, None, None),
    ] {
        let mut builder = WorkItem::builder()
            .issue(IssueRef::new(IssueSource::Github, id, "t", "u"))
            .repo_path("/repos/app")
            .state(state);
        if let Some(branch) = branch {
            builder = builder.branch(branch).session_id(format!("sess-{id}"));
            if let Some(pr) = pr {
                host.set_pr_state(branch, pr);
            }
        }
        store.insert(builder.build(&clock)).unwrap();
    }

    recover(&store, &host, &clock).await;
    let mut first = store.items();
    first.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));

    recover(&store, &host, &clock).await;
    let mut second = store.items();
    second.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));

    // Timestamps aside, states and bindings are unchanged
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.state, b.state);
        assert_eq!(a.session_id, b.session_id);
        assert_eq!(a.branch, b.branch);
        assert_eq!(a.completed_at.is_some(), b.completed_at.is_some());
    }
}
