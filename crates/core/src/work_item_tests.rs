// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::FakeClock;
use yare::parameterized;

fn queued_item(clock: &FakeClock) -> WorkItem {
    WorkItem::builder().build(clock)
}

#[test]
fn new_item_starts_queued() {
    let clock = FakeClock::new();
    let item = queued_item(&clock);

    assert_eq!(item.state, WorkItemState::Queued);
    assert!(item.session_id.is_none());
    assert!(item.completed_at.is_none());
    assert_eq!(item.created_at, item.updated_at);
}

#[parameterized(
    queued_to_coding = { WorkItemState::Queued, WorkItemState::Coding, true },
    queued_to_failed = { WorkItemState::Queued, WorkItemState::Failed, true },
    queued_to_merging = { WorkItemState::Queued, WorkItemState::Merging, false },
    coding_to_pr = { WorkItemState::Coding, WorkItemState::PrCreated, true },
    coding_recovery_requeue = { WorkItemState::Coding, WorkItemState::Queued, true },
    coding_to_completed = { WorkItemState::Coding, WorkItemState::Completed, false },
    review_to_feedback = { WorkItemState::AwaitingReview, WorkItemState::AddressingFeedback, true },
    review_to_ci = { WorkItemState::AwaitingReview, WorkItemState::AwaitingCi, true },
    review_to_abandoned = { WorkItemState::AwaitingReview, WorkItemState::Abandoned, true },
    review_to_failed = { WorkItemState::AwaitingReview, WorkItemState::Failed, false },
    feedback_to_pushing = { WorkItemState::AddressingFeedback, WorkItemState::Pushing, true },
    pushing_to_review = { WorkItemState::Pushing, WorkItemState::AwaitingReview, true },
    ci_retry_to_review = { WorkItemState::AwaitingCi, WorkItemState::AwaitingReview, true },
    ci_to_merging = { WorkItemState::AwaitingCi, WorkItemState::Merging, true },
    merging_to_completed = { WorkItemState::Merging, WorkItemState::Completed, true },
    merging_recovery = { WorkItemState::Merging, WorkItemState::AwaitingCi, true },
    completed_absorbing = { WorkItemState::Completed, WorkItemState::Queued, false },
    failed_absorbing = { WorkItemState::Failed, WorkItemState::Coding, false },
    abandoned_absorbing = { WorkItemState::Abandoned, WorkItemState::AwaitingReview, false },
)]
fn transition_table(from: WorkItemState, to: WorkItemState, legal: bool) {
    assert_eq!(from.can_transition_to(to), legal);
}

#[test]
fn invalid_transition_leaves_item_unchanged() {
    let clock = FakeClock::new();
    let mut item = queued_item(&clock);
    let before = item.clone();

    let err = item.transition(WorkItemState::Merging, &clock).unwrap_err();
    assert_eq!(
        err,
        StateError::InvalidTransition {
            from: WorkItemState::Queued,
            to: WorkItemState::Merging,
        }
    );
    assert_eq!(item, before);
}

#[test]
fn transition_updates_timestamps() {
    let clock = FakeClock::new();
    let mut item = queued_item(&clock);
    let created = item.created_at;

    clock.advance(std::time::Duration::from_secs(10));
    item.transition(WorkItemState::Coding, &clock).unwrap();

    assert_eq!(item.created_at, created);
    assert_eq!(item.updated_at - created, chrono::Duration::seconds(10));
    assert!(item.completed_at.is_none());
}

#[test]
fn terminal_entry_sets_completed_at_exactly_once() {
    let clock = FakeClock::new();
    let mut item = queued_item(&clock);

    item.cascade(
        &[
            WorkItemState::Coding,
            WorkItemState::PrCreated,
            WorkItemState::AwaitingReview,
            WorkItemState::AwaitingCi,
            WorkItemState::Merging,
        ],
        &clock,
    )
    .unwrap();
    assert!(item.completed_at.is_none());

    clock.advance(std::time::Duration::from_secs(1));
    item.transition(WorkItemState::Completed, &clock).unwrap();
    let completed = item.completed_at.unwrap();
    assert_eq!(completed, item.updated_at);

    // Absorbing: no further transitions, completed_at untouched
    let err = item.transition(WorkItemState::Queued, &clock);
    assert!(err.is_err());
    assert_eq!(item.completed_at, Some(completed));
}

#[test]
fn cascade_stops_at_first_illegal_step() {
    let clock = FakeClock::new();
    let mut item = queued_item(&clock);

    let err = item.cascade(&[WorkItemState::Coding, WorkItemState::Merging], &clock);
    assert!(err.is_err());
    // First step applied, second rejected
    assert_eq!(item.state, WorkItemState::Coding);
}

#[test]
fn record_failure_sets_error_fields() {
    let clock = FakeClock::new();
    let mut item = queued_item(&clock);
    item.transition(WorkItemState::Coding, &clock).unwrap();

    item.record_failure("push rejected", &clock).unwrap();

    assert_eq!(item.state, WorkItemState::Failed);
    assert_eq!(item.error_message.as_deref(), Some("push rejected"));
    assert_eq!(item.error_count, 1);
    assert!(item.completed_at.is_some());
}

#[test]
fn record_failure_on_terminal_item_is_rejected() {
    let clock = FakeClock::new();
    let mut item = WorkItem::builder()
        .state(WorkItemState::Completed)
        .build(&clock);

    assert!(item.record_failure("late error", &clock).is_err());
    assert_eq!(item.error_count, 0);
}

#[test]
fn comments_addressed_is_monotonic() {
    let clock = FakeClock::new();
    let mut item = queued_item(&clock);

    item.note_comments(3);
    assert_eq!(item.comments_addressed, 3);
    item.note_comments(1);
    assert_eq!(item.comments_addressed, 3);
    item.note_comments(7);
    assert_eq!(item.comments_addressed, 7);
}

#[test]
fn begin_feedback_round_counts_rounds() {
    let clock = FakeClock::new();
    let mut item = WorkItem::builder()
        .state(WorkItemState::AwaitingReview)
        .build(&clock);

    item.begin_feedback_round(3, &clock).unwrap();

    assert_eq!(item.state, WorkItemState::AddressingFeedback);
    assert_eq!(item.comments_addressed, 3);
    assert_eq!(item.feedback_rounds, 1);
}

#[test]
fn slot_and_shelved_predicates() {
    assert!(WorkItemState::Coding.holds_slot());
    assert!(WorkItemState::AddressingFeedback.holds_slot());
    assert!(!WorkItemState::AwaitingReview.holds_slot());

    assert!(WorkItemState::AwaitingReview.is_shelved());
    assert!(WorkItemState::AwaitingCi.is_shelved());
    assert!(!WorkItemState::Pushing.is_shelved());
}

#[test]
fn state_serde_is_snake_case() {
    let json = serde_json::to_string(&WorkItemState::AddressingFeedback).unwrap();
    assert_eq!(json, "\"addressing_feedback\"");

    let parsed: WorkItemState = serde_json::from_str("\"awaiting_ci\"").unwrap();
    assert_eq!(parsed, WorkItemState::AwaitingCi);
}

#[test]
fn work_item_serde_round_trip() {
    let clock = FakeClock::new();
    let mut item = WorkItem::builder()
        .state(WorkItemState::AwaitingReview)
        .session_id("sess-1")
        .branch("plural/issue-42")
        .pr_url("https://example.test/pr/9")
        .comments_addressed(2)
        .feedback_rounds(1)
        .build(&clock);
    item.note_comments(4);

    let json = serde_json::to_string(&item).unwrap();
    let parsed: WorkItem = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, item);
}

#[test]
fn every_path_reaches_exactly_one_terminal_state() {
    // Walk the legal-transition graph from `queued`; every maximal path
    // must end in exactly one terminal state.
    use WorkItemState::*;
    let all = [
        Queued,
        Coding,
        PrCreated,
        AwaitingReview,
        AddressingFeedback,
        Pushing,
        AwaitingCi,
        Merging,
        Completed,
        Failed,
        Abandoned,
    ];

    for state in all {
        let successors: Vec<_> = all
            .iter()
            .filter(|&&to| state.can_transition_to(to))
            .collect();
        if state.is_terminal() {
            assert!(successors.is_empty(), "{state} must be absorbing");
        } else {
            assert!(!successors.is_empty(), "{state} must not be a dead end");
        }
    }
}
