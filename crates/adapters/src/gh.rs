// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host adapter over the `gh` and `git` CLIs.
//!
//! PR queries go through `gh ... --json`; worktree and branch lifecycle go
//! through `git`. Every call is bounded by the deadlines in
//! [`crate::subprocess`].

use crate::host::{
    CiStatus, EventStream, HostAdapter, HostError, NewSession, PrSnapshot, PrState,
    ReviewComment, ReviewDecision, SessionBackend, StreamEvent,
};
use crate::subprocess::{
    run_bounded, run_checked, ExecError, COMMENT_FETCH_TIMEOUT, CREATE_PUSH_TIMEOUT,
    GIT_WORKTREE_TIMEOUT, MERGE_TIMEOUT, STATE_QUERY_TIMEOUT,
};
use async_trait::async_trait;
use plural_core::{MergeMethod, Session, SessionFlags, SessionId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::mpsc;

/// Concrete host adapter backed by `gh` and `git`.
#[derive(Clone)]
pub struct GhHostAdapter {
    /// Directory new session worktrees are created under.
    worktree_root: PathBuf,
}

impl GhHostAdapter {
    pub fn new(worktree_root: PathBuf) -> Self {
        Self { worktree_root }
    }

    fn gh(repo: &Path) -> Command {
        let mut cmd = Command::new("gh");
        cmd.current_dir(repo);
        cmd
    }

    fn git(dir: &Path) -> Command {
        let mut cmd = Command::new("git");
        cmd.current_dir(dir);
        cmd
    }

    async fn pr_view(
        &self,
        repo: &Path,
        branch: &str,
        fields: &str,
    ) -> Result<Option<String>, HostError> {
        let mut cmd = Self::gh(repo);
        cmd.args(["pr", "view", branch, "--json", fields]);
        match run_checked(cmd, STATE_QUERY_TIMEOUT, "gh pr view").await {
            Ok(json) => Ok(Some(json)),
            // gh reports a branch without a PR on stderr, not as JSON
            Err(ExecError::Failed { stderr, .. })
                if stderr.contains("no pull requests found") =>
            {
                Ok(None)
            }
            Err(e) => Err(HostError::CommandFailed(e.to_string())),
        }
    }
}

#[async_trait]
impl HostAdapter for GhHostAdapter {
    async fn pr_state(&self, repo: &Path, branch: &str) -> Result<PrState, HostError> {
        match self.pr_view(repo, branch, "state").await? {
            Some(json) => parse_pr_state(&json),
            None => Ok(PrState::NotFound),
        }
    }

    async fn review_decision(
        &self,
        repo: &Path,
        branch: &str,
    ) -> Result<ReviewDecision, HostError> {
        match self.pr_view(repo, branch, "reviewDecision").await? {
            Some(json) => parse_review_decision(&json),
            None => Ok(ReviewDecision::None),
        }
    }

    async fn check_status(&self, repo: &Path, branch: &str) -> Result<CiStatus, HostError> {
        match self.pr_view(repo, branch, "statusCheckRollup").await? {
            Some(json) => parse_check_status(&json),
            None => Ok(CiStatus::None),
        }
    }

    async fn batch_pr_states(
        &self,
        repo: &Path,
        branches: &[String],
    ) -> Result<HashMap<String, PrSnapshot>, HostError> {
        if branches.is_empty() {
            return Ok(HashMap::new());
        }
        let mut cmd = Self::gh(repo);
        cmd.args([
            "pr",
            "list",
            "--state",
            "all",
            "--limit",
            "200",
            "--json",
            "headRefName,state,comments",
        ]);
        let json = run_checked(cmd, STATE_QUERY_TIMEOUT, "gh pr list")
            .await
            .map_err(|e| HostError::CommandFailed(e.to_string()))?;
        let mut all = parse_pr_list(&json)?;
        // Branches without a PR report not_found so callers can requeue
        let mut result = HashMap::new();
        for branch in branches {
            let snapshot = all.remove(branch).unwrap_or(PrSnapshot {
                state: PrState::NotFound,
                comment_count: 0,
            });
            result.insert(branch.clone(), snapshot);
        }
        Ok(result)
    }

    async fn fetch_review_comments(
        &self,
        repo: &Path,
        branch: &str,
    ) -> Result<Vec<ReviewComment>, HostError> {
        let mut cmd = Self::gh(repo);
        cmd.args(["pr", "view", branch, "--json", "comments,reviews"]);
        let json = run_checked(cmd, COMMENT_FETCH_TIMEOUT, "gh pr view comments")
            .await
            .map_err(|e| HostError::CommandFailed(e.to_string()))?;
        parse_comments(&json)
    }

    async fn create_pr(
        &self,
        session: &Session,
        title: &str,
        body: &str,
    ) -> Result<EventStream, HostError> {
        let mut cmd = Self::gh(&session.worktree);
        cmd.args([
            "pr",
            "create",
            "--head",
            &session.branch,
            "--title",
            title,
            "--body",
            body,
        ]);
        Ok(spawn_stream(cmd, CREATE_PUSH_TIMEOUT, "gh pr create"))
    }

    async fn push_updates(&self, session: &Session) -> Result<EventStream, HostError> {
        let mut cmd = Self::git(&session.worktree);
        cmd.args(["push", "origin", &session.branch]);
        Ok(spawn_stream(cmd, CREATE_PUSH_TIMEOUT, "git push"))
    }

    async fn merge_pr(
        &self,
        repo: &Path,
        branch: &str,
        delete_branch: bool,
        method: MergeMethod,
    ) -> Result<(), HostError> {
        let mut cmd = Self::gh(repo);
        cmd.args(["pr", "merge", branch]);
        cmd.arg(match method {
            MergeMethod::Rebase => "--rebase",
            MergeMethod::Squash => "--squash",
            MergeMethod::Merge => "--merge",
        });
        if delete_branch {
            cmd.arg("--delete-branch");
        }
        run_checked(cmd, MERGE_TIMEOUT, "gh pr merge")
            .await
            .map_err(|e| HostError::CommandFailed(e.to_string()))?;
        Ok(())
    }

    async fn merge_to_parent(
        &self,
        child: &Session,
        parent: &Session,
        message: &str,
    ) -> Result<EventStream, HostError> {
        let mut cmd = Self::git(&parent.worktree);
        cmd.args(["merge", "--no-ff", &child.branch, "-m", message]);
        Ok(spawn_stream(cmd, MERGE_TIMEOUT, "git merge child branch"))
    }
}

#[async_trait]
impl SessionBackend for GhHostAdapter {
    async fn create_session(&self, spec: NewSession) -> Result<Session, HostError> {
        if self.branch_exists(&spec.repo_path, &spec.branch).await? {
            return Err(HostError::BranchExists(spec.branch));
        }

        let id = SessionId::generate();
        let worktree = self.worktree_root.join(worktree_dir_name(&spec.branch));

        let mut cmd = Self::git(&spec.repo_path);
        cmd.arg("worktree").arg("add").arg("-b").arg(&spec.branch);
        cmd.arg(&worktree).arg(&spec.base_branch);
        run_checked(cmd, GIT_WORKTREE_TIMEOUT, "git worktree add")
            .await
            .map_err(|e| HostError::CommandFailed(e.to_string()))?;

        tracing::info!(
            session_id = %id,
            branch = %spec.branch,
            worktree = %worktree.display(),
            "created session worktree"
        );

        Ok(Session {
            id,
            repo_path: spec.repo_path,
            worktree,
            branch: spec.branch,
            base_branch: spec.base_branch,
            issue: spec.issue,
            supervisor_id: spec.supervisor_id,
            flags: SessionFlags::default(),
            pr_url: None,
            comments_addressed: 0,
            created_at: chrono::Utc::now(),
        })
    }

    async fn branch_exists(&self, repo: &Path, branch: &str) -> Result<bool, HostError> {
        let mut cmd = Self::git(repo);
        cmd.args([
            "rev-parse",
            "--verify",
            "--quiet",
            &format!("refs/heads/{branch}"),
        ]);
        match run_bounded(cmd, STATE_QUERY_TIMEOUT, "git rev-parse").await {
            Ok(output) => Ok(output.status.success()),
            Err(e) => Err(HostError::CommandFailed(e.to_string())),
        }
    }

    async fn default_branch(&self, repo: &Path) -> Result<String, HostError> {
        let mut cmd = Self::git(repo);
        cmd.args(["symbolic-ref", "--short", "refs/remotes/origin/HEAD"]);
        match run_checked(cmd, STATE_QUERY_TIMEOUT, "git symbolic-ref").await {
            // "origin/main" -> "main"
            Ok(head) => Ok(head
                .rsplit('/')
                .next()
                .unwrap_or("main")
                .to_string()),
            Err(_) => Ok("main".to_string()),
        }
    }

    async fn remove_worktree(&self, session: &Session) -> Result<(), HostError> {
        let mut cmd = Self::git(&session.repo_path);
        cmd.arg("worktree")
            .arg("remove")
            .arg("--force")
            .arg(&session.worktree);
        run_checked(cmd, GIT_WORKTREE_TIMEOUT, "git worktree remove")
            .await
            .map_err(|e| HostError::CommandFailed(e.to_string()))?;
        Ok(())
    }
}

/// Run a command to completion, emitting stdout lines as stream events.
///
/// The terminal event carries success or the process's stderr.
fn spawn_stream(cmd: Command, timeout: Duration, description: &'static str) -> EventStream {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        match run_bounded(cmd, timeout, description).await {
            Ok(output) if output.status.success() => {
                for line in String::from_utf8_lossy(&output.stdout).lines() {
                    if tx.send(StreamEvent::line(line)).await.is_err() {
                        return;
                    }
                }
                let _ = tx.send(StreamEvent::done()).await;
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                let _ = tx
                    .send(StreamEvent::failed(format!("{description}: {stderr}")))
                    .await;
            }
            Err(e) => {
                let _ = tx.send(StreamEvent::failed(e.to_string())).await;
            }
        }
    });
    rx
}

/// Directory name for a branch's worktree (`plural/issue-42` →
/// `plural-issue-42`).
fn worktree_dir_name(branch: &str) -> String {
    branch.replace('/', "-")
}

fn parse_pr_state(json: &str) -> Result<PrState, HostError> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| HostError::Parse(e.to_string()))?;
    match value.get("state").and_then(|s| s.as_str()) {
        Some("OPEN") => Ok(PrState::Open),
        Some("CLOSED") => Ok(PrState::Closed),
        Some("MERGED") => Ok(PrState::Merged),
        other => Err(HostError::Parse(format!("unexpected PR state: {other:?}"))),
    }
}

fn parse_review_decision(json: &str) -> Result<ReviewDecision, HostError> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| HostError::Parse(e.to_string()))?;
    match value.get("reviewDecision").and_then(|s| s.as_str()) {
        Some("APPROVED") => Ok(ReviewDecision::Approved),
        Some("CHANGES_REQUESTED") => Ok(ReviewDecision::ChangesRequested),
        Some("") | Some("REVIEW_REQUIRED") | None => Ok(ReviewDecision::None),
        other => Err(HostError::Parse(format!(
            "unexpected review decision: {other:?}"
        ))),
    }
}

fn parse_check_status(json: &str) -> Result<CiStatus, HostError> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| HostError::Parse(e.to_string()))?;
    let Some(rollup) = value.get("statusCheckRollup").and_then(|v| v.as_array()) else {
        return Ok(CiStatus::None);
    };
    if rollup.is_empty() {
        return Ok(CiStatus::None);
    }

    let mut pending = false;
    for check in rollup {
        let status = check.get("status").and_then(|s| s.as_str()).unwrap_or("");
        let conclusion = check
            .get("conclusion")
            .and_then(|s| s.as_str())
            .unwrap_or("");
        match conclusion {
            "FAILURE" | "TIMED_OUT" | "CANCELLED" => return Ok(CiStatus::Fail),
            _ => {}
        }
        if status != "COMPLETED" {
            pending = true;
        }
    }

    if pending {
        Ok(CiStatus::Pending)
    } else {
        Ok(CiStatus::Pass)
    }
}

fn parse_pr_list(json: &str) -> Result<HashMap<String, PrSnapshot>, HostError> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| HostError::Parse(e.to_string()))?;
    let Some(prs) = value.as_array() else {
        return Err(HostError::Parse("expected a JSON array".to_string()));
    };

    let mut result = HashMap::new();
    for pr in prs {
        let Some(branch) = pr.get("headRefName").and_then(|v| v.as_str()) else {
            continue;
        };
        let state = match pr.get("state").and_then(|v| v.as_str()) {
            Some("OPEN") => PrState::Open,
            Some("CLOSED") => PrState::Closed,
            Some("MERGED") => PrState::Merged,
            _ => continue,
        };
        let comment_count = pr
            .get("comments")
            .and_then(|v| v.as_array())
            .map(|c| c.len() as u32)
            .unwrap_or(0);
        result.insert(
            branch.to_string(),
            PrSnapshot {
                state,
                comment_count,
            },
        );
    }
    Ok(result)
}

fn parse_comments(json: &str) -> Result<Vec<ReviewComment>, HostError> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| HostError::Parse(e.to_string()))?;

    let mut comments = Vec::new();
    for key in ["comments", "reviews"] {
        let Some(entries) = value.get(key).and_then(|v| v.as_array()) else {
            continue;
        };
        for entry in entries {
            let body = entry
                .get("body")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            // Reviews without a body (bare approvals) carry no feedback
            if body.is_empty() {
                continue;
            }
            let author = entry
                .get("author")
                .and_then(|a| a.get("login"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string();
            comments.push(ReviewComment {
                author,
                body,
                path: entry
                    .get("path")
                    .and_then(|v| v.as_str())
                    .map(String::from),
                line: entry.get("line").and_then(|v| v.as_u64()),
            });
        }
    }
    Ok(comments)
}

#[cfg(test)]
#[path = "gh_tests.rs"]
mod tests;
