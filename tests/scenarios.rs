// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end orchestration scenarios.
//!
//! These drive the engine through its public API against fake adapters:
//! issue intake, coding, PR creation, review feedback, CI, merge, external
//! events, crash recovery and intake deduplication.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use plural_adapters::{
    CiStatus, FakeHost, FakeProvider, FakeRunnerFactory, HostCall, IssueProvider, PrState,
    ProviderCall, ReviewComment, ReviewDecision,
};
use plural_core::{
    FakeClock, IssueRef, IssueSource, Session, SessionId, SessionState, WorkItem, WorkItemId,
    WorkItemState, WorkflowPolicy,
};
use plural_engine::{recover, Scheduler, SchedulerConfig};
use plural_storage::WorkItemStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

struct Orchestrator {
    scheduler: Scheduler<FakeHost, FakeRunnerFactory, FakeClock>,
    host: FakeHost,
    provider: Arc<FakeProvider>,
    clock: FakeClock,
    _dir: tempfile::TempDir,
}

fn orchestrator(policy: WorkflowPolicy) -> Orchestrator {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new();
    let clock = FakeClock::new();
    let provider = Arc::new(FakeProvider::new(IssueSource::Github));
    let store = Arc::new(WorkItemStore::new());

    let scheduler = Scheduler::new(
        store,
        vec![Arc::clone(&provider) as Arc<dyn IssueProvider>],
        host.clone(),
        FakeRunnerFactory::new(),
        clock.clone(),
        policy,
        SchedulerConfig {
            scope: "/repos/repoA".to_string(),
            repos: vec![PathBuf::from("/repos/repoA")],
            state_path: dir.path().join("state.json"),
        },
    );

    Orchestrator {
        scheduler,
        host,
        provider,
        clock,
        _dir: dir,
    }
}

fn issue_42() -> IssueRef {
    IssueRef::new(
        IssueSource::Github,
        "42",
        "!!!",
        "https://github.com/o/repoA/issues/42",
    )
}

fn id_42() -> WorkItemId {
    WorkItemId::new("/repos/repoA-42")
}

async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within deadline");
}

async fn wait_for_session(o: &Orchestrator, session_id: &SessionId) {
    let sessions = Arc::clone(o.scheduler.sessions());
    let id = session_id.clone();
    wait_until(move || sessions.get(&id).map(|s| s.is_completed()).unwrap_or(true)).await;
}

/// Happy path: intake, coding, PR, approval, CI, merge.
#[tokio::test]
async fn happy_path_from_intake_to_merge() {
    let mut o = orchestrator(WorkflowPolicy {
        auto_merge: true,
        ..WorkflowPolicy::default()
    });
    o.provider.push_poll(vec![issue_42()]);

    // Tick 1: intake + session + coding
    o.scheduler.tick().await.unwrap();
    let item = o.scheduler.store().get(&id_42()).unwrap();
    assert_eq!(item.state, WorkItemState::Coding);
    assert_eq!(item.branch.as_deref(), Some("plural/issue-42"));
    let session_id = item.session_id.clone().unwrap();

    // The worker ends its session; pretend the assistant created the PR
    // through a tool call
    let session = o.scheduler.sessions().get(&session_id).unwrap();
    session.mark_pr_created("https://example.test/pr/42");
    o.host.set_pr_state("plural/issue-42", PrState::Open);
    wait_for_session(&o, &session_id).await;

    // Tick 2: pr_created -> awaiting_review
    o.scheduler.tick().await.unwrap();
    let item = o.scheduler.store().get(&id_42()).unwrap();
    assert_eq!(item.state, WorkItemState::AwaitingReview);
    assert_eq!(item.pr_url.as_deref(), Some("https://example.test/pr/42"));

    // Next review poll: approved -> awaiting_ci; CI pass -> merged
    o.host
        .set_review_decision("plural/issue-42", ReviewDecision::Approved);
    o.host.set_ci_status("plural/issue-42", CiStatus::Pass);
    o.clock.advance(WorkflowPolicy::default().review_poll_interval);
    o.scheduler.tick().await.unwrap();

    let item = o.scheduler.store().get(&id_42()).unwrap();
    assert_eq!(item.state, WorkItemState::Completed);
    assert!(item.completed_at.is_some());
}

/// New review comments start a feedback round and push the result.
#[tokio::test]
async fn feedback_round_addresses_new_comments() {
    let o = orchestrator(WorkflowPolicy::default());
    let mut scheduler = o.scheduler;

    // Seed an item already awaiting review with a live session
    let item = WorkItem::builder()
        .issue(issue_42())
        .repo_path("/repos/repoA")
        .state(WorkItemState::AwaitingReview)
        .branch("plural/issue-42")
        .session_id("sess-42")
        .build(&o.clock);
    scheduler.store().insert(item).unwrap();
    scheduler.sessions().register(SessionState::new(
        Session::builder()
            .id("sess-42")
            .repo_path("/repos/repoA")
            .branch("plural/issue-42")
            .issue(issue_42())
            .pr_created("https://example.test/pr/42")
            .build(),
    ));

    o.host.set_pr_state("plural/issue-42", PrState::Open);
    o.host.set_comments(
        "plural/issue-42",
        vec![
            ReviewComment {
                author: "reviewer".to_string(),
                body: "first".to_string(),
                path: None,
                line: None,
            },
            ReviewComment {
                author: "reviewer".to_string(),
                body: "second".to_string(),
                path: None,
                line: None,
            },
            ReviewComment {
                author: "reviewer".to_string(),
                body: "third".to_string(),
                path: None,
                line: None,
            },
        ],
    );

    scheduler.tick().await.unwrap();

    let item = scheduler.store().get(&id_42()).unwrap();
    assert_eq!(item.state, WorkItemState::AddressingFeedback);
    assert_eq!(item.comments_addressed, 3);

    // The worker prompt literally names the comment count
    wait_until(|| {
        scheduler
            .sessions()
            .get(&SessionId::new("sess-42"))
            .map(|s| s.is_completed())
            .unwrap_or(false)
    })
    .await;

    scheduler.tick().await.unwrap();
    let item = scheduler.store().get(&id_42()).unwrap();
    assert_eq!(item.state, WorkItemState::AwaitingReview);
    assert_eq!(item.feedback_rounds, 1);
    assert!(o
        .host
        .calls()
        .iter()
        .any(|c| matches!(c, HostCall::PushUpdates { branch } if branch == "plural/issue-42")));
}

/// The concurrency cap keeps the second item queued.
#[tokio::test]
async fn concurrency_cap_queues_second_item() {
    let mut o = orchestrator(WorkflowPolicy {
        max_concurrent: 1,
        ..WorkflowPolicy::default()
    });
    o.provider.push_poll(vec![
        IssueRef::new(IssueSource::Github, "1", "Task A", "https://x/1"),
        IssueRef::new(IssueSource::Github, "2", "Task B", "https://x/2"),
    ]);

    o.scheduler.tick().await.unwrap();

    let items = o.scheduler.store().items();
    let coding = items
        .iter()
        .filter(|item| item.state == WorkItemState::Coding)
        .count();
    let queued = items
        .iter()
        .filter(|item| item.state == WorkItemState::Queued)
        .count();
    assert_eq!((coding, queued), (1, 1));

    // The queued item starts only after the first leaves its slot
    let active = items
        .into_iter()
        .find(|item| item.state == WorkItemState::Coding)
        .unwrap();
    wait_for_session(&o, active.session_id.as_ref().unwrap()).await;
    o.scheduler.tick().await.unwrap();

    let still_queued = o
        .scheduler
        .store()
        .items()
        .iter()
        .filter(|item| item.state == WorkItemState::Queued)
        .count();
    assert_eq!(still_queued, 0);
}

/// A PR merged externally completes the item in one tick, including
/// the best-effort WIP label removal.
#[tokio::test]
async fn externally_merged_pr_completes_item() {
    let o = orchestrator(WorkflowPolicy::default());
    let mut scheduler = o.scheduler;

    scheduler
        .store()
        .insert(
            WorkItem::builder()
                .issue(issue_42())
                .repo_path("/repos/repoA")
                .state(WorkItemState::AwaitingReview)
                .branch("plural/issue-42")
                .session_id("sess-42")
                .pr_url("https://example.test/pr/42")
                .build(&o.clock),
        )
        .unwrap();
    o.host.set_pr_state("plural/issue-42", PrState::Merged);
    // Label removal failure is tolerated
    o.provider.set_mark_error("label service down");

    scheduler.tick().await.unwrap();

    let item = scheduler.store().get(&id_42()).unwrap();
    assert_eq!(item.state, WorkItemState::Completed);
    assert!(item.completed_at.is_some());

    let provider = Arc::clone(&o.provider);
    wait_until(move || {
        provider.calls().iter().any(|c| {
            matches!(c, ProviderCall::MarkDone { issue_id } if issue_id == "42")
        })
    })
    .await;
}

/// A PR closed externally abandons the item, terminally.
#[tokio::test]
async fn externally_closed_pr_abandons_item() {
    let o = orchestrator(WorkflowPolicy::default());
    let mut scheduler = o.scheduler;

    scheduler
        .store()
        .insert(
            WorkItem::builder()
                .issue(issue_42())
                .repo_path("/repos/repoA")
                .state(WorkItemState::AwaitingReview)
                .branch("plural/issue-42")
                .build(&o.clock),
        )
        .unwrap();
    o.host.set_pr_state("plural/issue-42", PrState::Closed);

    scheduler.tick().await.unwrap();

    let item = scheduler.store().get(&id_42()).unwrap();
    assert_eq!(item.state, WorkItemState::Abandoned);
    assert!(item.completed_at.is_some());
    assert!(item.state.is_terminal());
}

/// Recovery after a crash while coding resumes at review without
/// restarting the worker.
#[tokio::test]
async fn recovery_resumes_interrupted_coding_at_review() {
    let clock = FakeClock::new();
    let host = FakeHost::new();
    let store = WorkItemStore::new();
    store
        .insert(
            WorkItem::builder()
                .issue(issue_42())
                .repo_path("/repos/repoA")
                .state(WorkItemState::Coding)
                .branch("plural/issue-42")
                .session_id("sess-42")
                .build(&clock),
        )
        .unwrap();
    host.set_pr_state("plural/issue-42", PrState::Open);

    recover(&store, &host, &clock).await;

    let item = store.get(&id_42()).unwrap();
    assert_eq!(item.state, WorkItemState::AwaitingReview);

    // Idempotent: a second pass changes nothing
    recover(&store, &host, &clock).await;
    assert_eq!(store.get(&id_42()).unwrap().state, WorkItemState::AwaitingReview);
}

/// Duplicate intake is suppressed when the issue is already in
/// flight, even twice within a single poll.
#[tokio::test]
async fn duplicate_intake_is_suppressed() {
    let mut o = orchestrator(WorkflowPolicy::default());

    // A session for issue 42 already exists on this repo
    o.scheduler.sessions().register(SessionState::new(
        Session::builder()
            .id("sess-live")
            .repo_path("/repos/repoA")
            .branch("plural/issue-42")
            .issue(issue_42())
            .build(),
    ));
    o.provider.push_poll(vec![issue_42(), issue_42()]);

    o.scheduler.tick().await.unwrap();

    assert!(o.scheduler.store().is_empty());
}
