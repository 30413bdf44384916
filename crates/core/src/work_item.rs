// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Work item identifier and state machine.
//!
//! A [`WorkItem`] tracks one issue end-to-end: intake, coding, pull request,
//! review feedback, CI and merge. Transitions are validated against the
//! legal-transition table; terminal states are absorbing. Invalid transitions
//! return [`StateError::InvalidTransition`] and leave the item untouched.

use crate::clock::Clock;
use crate::issue::IssueRef;
use crate::session::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Unique identifier for a work item: `<repo path>-<issue id>`.
///
/// Derived from the issue reference at intake (see
/// [`IssueRef::work_item_id`]); opaque everywhere else. Serialises as the
/// bare string so it can key the persisted work-item map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItemId(String);

impl WorkItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for WorkItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for WorkItemId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Lifecycle position of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemState {
    /// Accepted from a poll, waiting for a concurrency slot
    Queued,
    /// An assistant session is implementing the change
    Coding,
    /// Pull request exists (transient; advances to awaiting review)
    PrCreated,
    /// Blocked on external review activity
    AwaitingReview,
    /// An assistant session is addressing review comments
    AddressingFeedback,
    /// Feedback round finished, pushing the updated branch
    Pushing,
    /// Approved, blocked on CI checks
    AwaitingCi,
    /// Merge in progress
    Merging,
    /// Merged and closed out
    Completed,
    /// Unrecoverable per-item failure
    Failed,
    /// PR closed externally or abandoned by policy
    Abandoned,
}

impl WorkItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkItemState::Queued => "queued",
            WorkItemState::Coding => "coding",
            WorkItemState::PrCreated => "pr_created",
            WorkItemState::AwaitingReview => "awaiting_review",
            WorkItemState::AddressingFeedback => "addressing_feedback",
            WorkItemState::Pushing => "pushing",
            WorkItemState::AwaitingCi => "awaiting_ci",
            WorkItemState::Merging => "merging",
            WorkItemState::Completed => "completed",
            WorkItemState::Failed => "failed",
            WorkItemState::Abandoned => "abandoned",
        }
    }

    /// Whether this state admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkItemState::Completed | WorkItemState::Failed | WorkItemState::Abandoned
        )
    }

    /// Whether an item in this state consumes a concurrency slot.
    pub fn holds_slot(&self) -> bool {
        matches!(
            self,
            WorkItemState::Coding | WorkItemState::AddressingFeedback
        )
    }

    /// Whether an item in this state is shelved: blocked on an external
    /// event and checked on each scheduler tick rather than by a worker.
    pub fn is_shelved(&self) -> bool {
        matches!(
            self,
            WorkItemState::AwaitingReview | WorkItemState::AwaitingCi
        )
    }

    /// Legal-transition table. Recovery re-uses ordinary edges (e.g.
    /// `coding → queued` when a session is lost, `merging → awaiting_ci`
    /// when a merge outcome could not be confirmed).
    pub fn can_transition_to(&self, to: WorkItemState) -> bool {
        use WorkItemState::*;
        match self {
            Queued => matches!(to, Coding | Failed),
            Coding => matches!(to, PrCreated | Failed | Queued),
            PrCreated => matches!(to, AwaitingReview | Failed | Queued),
            AwaitingReview => matches!(to, AddressingFeedback | AwaitingCi | Abandoned),
            AddressingFeedback => matches!(to, Pushing | Failed | AwaitingReview),
            Pushing => matches!(to, AwaitingReview | Failed),
            AwaitingCi => matches!(to, Merging | AwaitingReview | Failed | Abandoned),
            Merging => matches!(to, Completed | Failed | AwaitingCi),
            Completed | Failed | Abandoned => false,
        }
    }
}

impl fmt::Display for WorkItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State machine violations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: WorkItemState,
        to: WorkItemState,
    },
}

/// One logical task tracked end-to-end, mapped 1:1 to an external issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    #[serde(rename = "issue_ref")]
    pub issue: IssueRef,
    /// Repository the issue was polled from
    #[serde(default)]
    pub repo_path: PathBuf,
    pub state: WorkItemState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    /// High-watermark of review comments acknowledged. Never decreases.
    #[serde(default)]
    pub comments_addressed: u32,
    #[serde(default)]
    pub feedback_rounds: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub error_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set exactly once, on entry to a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    /// Create a queued work item for an issue.
    pub fn new(issue: IssueRef, repo_path: PathBuf, clock: &impl Clock) -> Self {
        let now = clock.timestamp();
        Self {
            id: issue.work_item_id(&repo_path),
            issue,
            repo_path,
            state: WorkItemState::Queued,
            session_id: None,
            branch: None,
            pr_url: None,
            comments_addressed: 0,
            feedback_rounds: 0,
            error_message: None,
            error_count: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Move to `to`, validating against the transition table.
    ///
    /// Updates `updated_at`; entering a terminal state sets `completed_at`.
    /// On an illegal transition nothing is mutated.
    pub fn transition(
        &mut self,
        to: WorkItemState,
        clock: &impl Clock,
    ) -> Result<(), StateError> {
        if !self.state.can_transition_to(to) {
            return Err(StateError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        self.updated_at = clock.timestamp();
        if to.is_terminal() {
            self.completed_at = Some(self.updated_at);
        }
        Ok(())
    }

    /// Apply a sequence of transitions, stopping at the first illegal one.
    ///
    /// Used where one observation advances an item through several states
    /// (e.g. a PR merged externally cascades all the way to `completed`).
    pub fn cascade(
        &mut self,
        path: &[WorkItemState],
        clock: &impl Clock,
    ) -> Result<(), StateError> {
        for &state in path {
            self.transition(state, clock)?;
        }
        Ok(())
    }

    /// Fail the item, recording the error. The transition itself is
    /// validated; terminal items cannot be re-failed.
    pub fn record_failure(
        &mut self,
        message: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), StateError> {
        self.transition(WorkItemState::Failed, clock)?;
        self.error_message = Some(message.into());
        self.error_count += 1;
        Ok(())
    }

    /// Raise the comments high-watermark. Monotonic: a lower count is
    /// ignored.
    pub fn note_comments(&mut self, count: u32) {
        if count > self.comments_addressed {
            self.comments_addressed = count;
        }
    }

    /// Enter a feedback round: acknowledge `comment_count` comments and
    /// move to `addressing_feedback`.
    pub fn begin_feedback_round(
        &mut self,
        comment_count: u32,
        clock: &impl Clock,
    ) -> Result<(), StateError> {
        self.transition(WorkItemState::AddressingFeedback, clock)?;
        self.note_comments(comment_count);
        self.feedback_rounds += 1;
        Ok(())
    }

    /// Bind a session and branch when coding starts.
    pub fn with_session(mut self, session_id: SessionId, branch: String) -> Self {
        self.session_id = Some(session_id);
        self.branch = Some(branch);
        self
    }
}

/// Builder for `WorkItem` with test defaults.
#[cfg(any(test, feature = "test-support"))]
pub struct WorkItemBuilder {
    issue: IssueRef,
    repo_path: PathBuf,
    state: WorkItemState,
    session_id: Option<SessionId>,
    branch: Option<String>,
    pr_url: Option<String>,
    comments_addressed: u32,
    feedback_rounds: u32,
}

#[cfg(any(test, feature = "test-support"))]
impl Default for WorkItemBuilder {
    fn default() -> Self {
        Self {
            issue: IssueRef::new(
                crate::issue::IssueSource::Github,
                "1",
                "test issue",
                "https://example.test/1",
            ),
            repo_path: PathBuf::from("/tmp/repo"),
            state: WorkItemState::Queued,
            session_id: None,
            branch: None,
            pr_url: None,
            comments_addressed: 0,
            feedback_rounds: 0,
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl WorkItemBuilder {
    pub fn issue(mut self, v: IssueRef) -> Self {
        self.issue = v;
        self
    }
    pub fn repo_path(mut self, v: impl Into<PathBuf>) -> Self {
        self.repo_path = v.into();
        self
    }
    pub fn state(mut self, v: WorkItemState) -> Self {
        self.state = v;
        self
    }
    pub fn session_id(mut self, v: impl Into<SessionId>) -> Self {
        self.session_id = Some(v.into());
        self
    }
    pub fn branch(mut self, v: impl Into<String>) -> Self {
        self.branch = Some(v.into());
        self
    }
    pub fn pr_url(mut self, v: impl Into<String>) -> Self {
        self.pr_url = Some(v.into());
        self
    }
    pub fn comments_addressed(mut self, v: u32) -> Self {
        self.comments_addressed = v;
        self
    }
    pub fn feedback_rounds(mut self, v: u32) -> Self {
        self.feedback_rounds = v;
        self
    }
    pub fn build(self, clock: &impl Clock) -> WorkItem {
        let mut item = WorkItem::new(self.issue, self.repo_path, clock);
        item.state = self.state;
        item.session_id = self.session_id;
        item.branch = self.branch;
        item.pr_url = self.pr_url;
        item.comments_addressed = self.comments_addressed;
        item.feedback_rounds = self.feedback_rounds;
        item
    }
}

#[cfg(any(test, feature = "test-support"))]
impl WorkItem {
    /// Create a builder with test defaults.
    pub fn builder() -> WorkItemBuilder {
        WorkItemBuilder::default()
    }
}

#[cfg(test)]
#[path = "work_item_tests.rs"]
mod tests;
