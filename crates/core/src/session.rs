// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Assistant sessions.
//!
//! A [`Session`] binds an assistant runner to one branch and worktree. The
//! core mutates only the session flags and the pending-message slot; the
//! worktree itself is owned by the adapters.

use crate::issue::IssueRef;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Unique identifier for an assistant session.
///
/// Minted by the session backend when it creates the working copy; work
/// items hold it to find their session again across feedback rounds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh random id for a newly created session.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Lifecycle flags, flipped by the worker and the auto-merge machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFlags {
    #[serde(default)]
    pub started: bool,
    #[serde(default)]
    pub pr_created: bool,
    #[serde(default)]
    pub pr_merged: bool,
    #[serde(default)]
    pub pr_closed: bool,
}

/// One assistant session bound to a branch and worktree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub repo_path: PathBuf,
    pub worktree: PathBuf,
    pub branch: String,
    pub base_branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<IssueRef>,
    /// Parent session when this is a child spawned through a tool call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisor_id: Option<SessionId>,
    #[serde(default)]
    pub flags: SessionFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    /// Comment high-watermark used by the in-worker auto-merge loop.
    #[serde(default)]
    pub comments_addressed: u32,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_child(&self) -> bool {
        self.supervisor_id.is_some()
    }
}

/// Shared, mutable view of a session.
///
/// The worker, the auto-merge machine and the supervisor message path all
/// hold the same `Arc<SessionState>`. The pending message is a single
/// overwrite slot with take-and-clear semantics, not a queue: only the
/// latest supervisor update or auto-merge prompt is relevant.
pub struct SessionState {
    session: Mutex<Session>,
    pending: Mutex<Option<String>>,
    completed: AtomicBool,
}

impl SessionState {
    pub fn new(session: Session) -> Arc<Self> {
        Arc::new(Self {
            session: Mutex::new(session),
            pending: Mutex::new(None),
            completed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> SessionId {
        self.session.lock().id.clone()
    }

    pub fn branch(&self) -> String {
        self.session.lock().branch.clone()
    }

    pub fn supervisor_id(&self) -> Option<SessionId> {
        self.session.lock().supervisor_id.clone()
    }

    pub fn flags(&self) -> SessionFlags {
        self.session.lock().flags
    }

    pub fn pr_url(&self) -> Option<String> {
        self.session.lock().pr_url.clone()
    }

    pub fn comments_addressed(&self) -> u32 {
        self.session.lock().comments_addressed
    }

    /// Raise the comment high-watermark (monotonic).
    pub fn note_comments(&self, count: u32) {
        let mut session = self.session.lock();
        if count > session.comments_addressed {
            session.comments_addressed = count;
        }
    }

    /// Clone of the current session record.
    pub fn snapshot(&self) -> Session {
        self.session.lock().clone()
    }

    pub fn mark_started(&self) {
        self.session.lock().flags.started = true;
    }

    pub fn mark_pr_created(&self, url: impl Into<String>) {
        let mut session = self.session.lock();
        session.flags.pr_created = true;
        session.pr_url = Some(url.into());
    }

    pub fn mark_pr_merged(&self) {
        self.session.lock().flags.pr_merged = true;
    }

    pub fn mark_pr_closed(&self) {
        self.session.lock().flags.pr_closed = true;
    }

    /// Overwrite the pending message slot.
    pub fn set_pending_message(&self, message: impl Into<String>) {
        *self.pending.lock() = Some(message.into());
    }

    /// Atomically take and clear the pending message.
    pub fn take_pending_message(&self) -> Option<String> {
        self.pending.lock().take()
    }

    /// Whether the worker driving this session has finished.
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    pub fn mark_completed(&self) {
        self.completed.store(true, Ordering::Release);
    }
}

/// Builder for `Session` with test defaults.
#[cfg(any(test, feature = "test-support"))]
pub struct SessionBuilder {
    id: SessionId,
    repo_path: PathBuf,
    worktree: PathBuf,
    branch: String,
    base_branch: String,
    issue: Option<IssueRef>,
    supervisor_id: Option<SessionId>,
    flags: SessionFlags,
    pr_url: Option<String>,
}

#[cfg(any(test, feature = "test-support"))]
impl Default for SessionBuilder {
    fn default() -> Self {
        Self {
            id: SessionId::new("sess-1"),
            repo_path: PathBuf::from("/tmp/repo"),
            worktree: PathBuf::from("/tmp/repo-worktrees/sess-1"),
            branch: "plural/issue-1".to_string(),
            base_branch: "main".to_string(),
            issue: None,
            supervisor_id: None,
            flags: SessionFlags::default(),
            pr_url: None,
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl SessionBuilder {
    pub fn id(mut self, v: impl Into<SessionId>) -> Self {
        self.id = v.into();
        self
    }
    pub fn repo_path(mut self, v: impl Into<PathBuf>) -> Self {
        self.repo_path = v.into();
        self
    }
    pub fn branch(mut self, v: impl Into<String>) -> Self {
        self.branch = v.into();
        self
    }
    pub fn issue(mut self, v: IssueRef) -> Self {
        self.issue = Some(v);
        self
    }
    pub fn supervisor_id(mut self, v: impl Into<SessionId>) -> Self {
        self.supervisor_id = Some(v.into());
        self
    }
    pub fn pr_created(mut self, url: impl Into<String>) -> Self {
        self.flags.pr_created = true;
        self.pr_url = Some(url.into());
        self
    }
    pub fn build(self) -> Session {
        Session {
            id: self.id,
            repo_path: self.repo_path,
            worktree: self.worktree,
            branch: self.branch,
            base_branch: self.base_branch,
            issue: self.issue,
            supervisor_id: self.supervisor_id,
            flags: self.flags,
            pr_url: self.pr_url,
            comments_addressed: 0,
            created_at: chrono::Utc::now(),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Session {
    /// Create a builder with test defaults.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
