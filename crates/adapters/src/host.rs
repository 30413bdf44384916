// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host and version-control adapter contracts.
//!
//! The engine consumes the pull-request host and the local working copies
//! through these traits. Long-running operations (PR creation, pushes,
//! child merges) return a finite stream of [`StreamEvent`]s; the terminal
//! event carries success or the error. Point queries return plain results
//! and are bounded by the deadlines in [`crate::subprocess`].

use async_trait::async_trait;
use plural_core::{IssueRef, MergeMethod, Session, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from host and session-backend operations.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("command failed: {0}")]
    CommandFailed(String),
    #[error("unexpected host output: {0}")]
    Parse(String),
    #[error("branch already exists: {0}")]
    BranchExists(String),
    #[error("adapter stream reported: {0}")]
    Stream(String),
    #[error("adapter stream ended without a terminal event")]
    StreamTruncated,
}

/// Pull request state as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrState {
    Open,
    Closed,
    Merged,
    NotFound,
}

impl fmt::Display for PrState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrState::Open => "open",
            PrState::Closed => "closed",
            PrState::Merged => "merged",
            PrState::NotFound => "not_found",
        };
        write!(f, "{s}")
    }
}

/// Review decision on a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    ChangesRequested,
    None,
}

/// Combined CI check status on a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiStatus {
    Pass,
    Fail,
    Pending,
    None,
}

/// One branch's PR state plus its comment count, from the batch query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrSnapshot {
    pub state: PrState,
    pub comment_count: u32,
}

/// A review comment on a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewComment {
    pub author: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
}

/// One event of a finite adapter stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub text: String,
    pub error: Option<String>,
    pub done: bool,
}

impl StreamEvent {
    pub fn line(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            error: None,
            done: false,
        }
    }

    pub fn done() -> Self {
        Self {
            text: String::new(),
            error: None,
            done: true,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            error: Some(error.into()),
            done: true,
        }
    }
}

/// Finite lazy sequence of adapter events.
pub type EventStream = mpsc::Receiver<StreamEvent>;

/// Drain an adapter stream to completion, collecting its output lines.
///
/// Returns the lines up to the terminal event, or the stream's error. A
/// stream that closes without a terminal event is an error: the adapter
/// task died.
pub async fn drain_stream(mut rx: EventStream) -> Result<Vec<String>, HostError> {
    let mut lines = Vec::new();
    while let Some(event) = rx.recv().await {
        if let Some(error) = event.error {
            return Err(HostError::Stream(error));
        }
        if !event.text.is_empty() {
            lines.extend(event.text.lines().map(String::from));
        }
        if event.done {
            return Ok(lines);
        }
    }
    Err(HostError::StreamTruncated)
}

/// Last URL-looking line of a stream's output.
///
/// Hosts print the PR URL as the final line of `pr create`; this is the
/// convention the engine relies on to learn the URL.
pub fn last_url_line(lines: &[String]) -> Option<String> {
    lines
        .iter()
        .rev()
        .map(|line| line.trim())
        .find(|line| line.starts_with("https://") || line.starts_with("http://"))
        .map(String::from)
}

/// Pull-request host operations.
#[async_trait]
pub trait HostAdapter: Clone + Send + Sync + 'static {
    /// State of the PR for a branch (`not_found` when none exists).
    async fn pr_state(&self, repo: &Path, branch: &str) -> Result<PrState, HostError>;

    async fn review_decision(&self, repo: &Path, branch: &str)
        -> Result<ReviewDecision, HostError>;

    async fn check_status(&self, repo: &Path, branch: &str) -> Result<CiStatus, HostError>;

    /// One host round-trip covering several branches: state + comment count.
    async fn batch_pr_states(
        &self,
        repo: &Path,
        branches: &[String],
    ) -> Result<HashMap<String, PrSnapshot>, HostError>;

    async fn fetch_review_comments(
        &self,
        repo: &Path,
        branch: &str,
    ) -> Result<Vec<ReviewComment>, HostError>;

    /// Create a PR for the session's branch. The stream's last URL line is
    /// the PR URL.
    async fn create_pr(
        &self,
        session: &Session,
        title: &str,
        body: &str,
    ) -> Result<EventStream, HostError>;

    /// Push the session's branch to the host.
    async fn push_updates(&self, session: &Session) -> Result<EventStream, HostError>;

    async fn merge_pr(
        &self,
        repo: &Path,
        branch: &str,
        delete_branch: bool,
        method: MergeMethod,
    ) -> Result<(), HostError>;

    /// Merge a child session's branch into its supervisor's worktree.
    async fn merge_to_parent(
        &self,
        child: &Session,
        parent: &Session,
        message: &str,
    ) -> Result<EventStream, HostError>;
}

/// Parameters for creating a session working copy.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub repo_path: std::path::PathBuf,
    pub branch: String,
    pub base_branch: String,
    pub issue: Option<IssueRef>,
    pub supervisor_id: Option<SessionId>,
}

/// Working-copy lifecycle: worktrees and branches for sessions.
#[async_trait]
pub trait SessionBackend: Clone + Send + Sync + 'static {
    /// Create a branch + worktree for a new session.
    ///
    /// Fails with [`HostError::BranchExists`] when the branch is taken.
    async fn create_session(&self, spec: NewSession) -> Result<Session, HostError>;

    async fn branch_exists(&self, repo: &Path, branch: &str) -> Result<bool, HostError>;

    /// Default branch new sessions are based on (e.g. `main`).
    async fn default_branch(&self, repo: &Path) -> Result<String, HostError>;

    /// Remove a session's worktree. Best-effort cleanup after merge.
    async fn remove_worktree(&self, session: &Session) -> Result<(), HostError>;
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
