// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Assistant-runner channel surface.
//!
//! The LLM assistant is an external subprocess; the core consumes it as an
//! object exposing channels. Prompts go in through
//! [`AssistantRunner::send_prompt`], which returns a finite stream of
//! [`ResponseChunk`]s. Tool-call requests surface on the receivers in
//! [`RunnerChannels`]; each request carries a `oneshot` reply sender. A
//! runner that does not implement a given tool leaves its channel `None`,
//! and the worker models it as a source that never fires.

use async_trait::async_trait;
use plural_core::{Session, SessionId};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Errors from the assistant runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to start assistant: {0}")]
    SpawnFailed(String),
    #[error("assistant is no longer running")]
    Closed,
    #[error("assistant reported: {0}")]
    Runner(String),
}

/// One chunk of a streamed assistant response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseChunk {
    pub text: String,
    /// Final chunk of this response
    pub done: bool,
    /// Unrecoverable runner error; terminates the session
    pub error: Option<String>,
}

impl ResponseChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn done() -> Self {
        Self {
            done: true,
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            done: true,
            text: String::new(),
        }
    }
}

/// Permission request from the assistant (tool approval).
#[derive(Debug)]
pub struct PermissionRequest {
    pub description: String,
    pub reply: oneshot::Sender<PermissionResponse>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionResponse {
    pub allow: bool,
    pub message: String,
}

/// A question the assistant asks, with optional preset options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub text: String,
    /// Option labels; empty when the question is free-form
    pub options: Vec<String>,
}

#[derive(Debug)]
pub struct QuestionRequest {
    pub questions: Vec<Question>,
    /// One answer per question, in order
    pub reply: oneshot::Sender<Vec<String>>,
}

#[derive(Debug)]
pub struct PlanApprovalRequest {
    pub summary: String,
    pub reply: oneshot::Sender<bool>,
}

/// Request to create a child session (supervisor tool call).
#[derive(Debug)]
pub struct CreateChildRequest {
    /// Task description for the child's initial prompt
    pub task: String,
    pub reply: oneshot::Sender<Result<ChildInfo, String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildInfo {
    pub session_id: SessionId,
    pub branch: String,
}

#[derive(Debug)]
pub struct ListChildrenRequest {
    pub reply: oneshot::Sender<Vec<ChildStatus>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildStatus {
    pub session_id: SessionId,
    pub branch: String,
    pub state: ChildSessionState,
}

/// Observable status of a registered child session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildSessionState {
    Running,
    Idle,
    PrCreated,
    Merged,
}

impl ChildSessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChildSessionState::Running => "running",
            ChildSessionState::Idle => "idle",
            ChildSessionState::PrCreated => "pr_created",
            ChildSessionState::Merged => "merged",
        }
    }
}

#[derive(Debug)]
pub struct MergeChildRequest {
    pub child: SessionId,
    pub reply: oneshot::Sender<Result<(), String>>,
}

#[derive(Debug)]
pub struct CreatePrRequest {
    pub title: String,
    pub body: String,
    /// Replies with the PR URL
    pub reply: oneshot::Sender<Result<String, String>>,
}

#[derive(Debug)]
pub struct PushBranchRequest {
    pub reply: oneshot::Sender<Result<(), String>>,
}

#[derive(Debug)]
pub struct ReviewCommentsRequest {
    pub reply: oneshot::Sender<Result<Vec<crate::host::ReviewComment>, String>>,
}

/// Request/reply channels exposed by a runner.
///
/// A `None` channel is a tool the runner does not expose; it never
/// participates in the worker's readiness set.
#[derive(Debug, Default)]
pub struct RunnerChannels {
    pub permission: Option<mpsc::Receiver<PermissionRequest>>,
    pub question: Option<mpsc::Receiver<QuestionRequest>>,
    pub plan_approval: Option<mpsc::Receiver<PlanApprovalRequest>>,
    pub create_child: Option<mpsc::Receiver<CreateChildRequest>>,
    pub list_children: Option<mpsc::Receiver<ListChildrenRequest>>,
    pub merge_child: Option<mpsc::Receiver<MergeChildRequest>>,
    pub create_pr: Option<mpsc::Receiver<CreatePrRequest>>,
    pub push_branch: Option<mpsc::Receiver<PushBranchRequest>>,
    pub review_comments: Option<mpsc::Receiver<ReviewCommentsRequest>>,
}

/// A live assistant bound to one session.
#[async_trait]
pub trait AssistantRunner: Send + Sync + 'static {
    /// Send a prompt; returns the finite response stream for this turn.
    async fn send_prompt(
        &mut self,
        prompt: &str,
    ) -> Result<mpsc::Receiver<ResponseChunk>, RunnerError>;

    /// Hand the request channels to the worker. Called once at worker
    /// start; subsequent calls return empty channels.
    fn take_channels(&mut self) -> RunnerChannels;
}

/// Creates runners for new sessions (one per coding or feedback round).
pub trait RunnerFactory: Clone + Send + Sync + 'static {
    type Runner: AssistantRunner;

    fn create(&self, session: &Session) -> Result<Self::Runner, RunnerError>;
}

/// Minimal production runner: one assistant subprocess per prompt.
///
/// The prompt is written to the process's stdin; stdout lines stream back
/// as response chunks. This runner exposes no tool channels; assistants
/// with a richer IPC surface provide their own [`AssistantRunner`].
pub struct CommandRunner {
    command: String,
    worktree: std::path::PathBuf,
}

#[async_trait]
impl AssistantRunner for CommandRunner {
    async fn send_prompt(
        &mut self,
        prompt: &str,
    ) -> Result<mpsc::Receiver<ResponseChunk>, RunnerError> {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(&self.command)
            .current_dir(&self.worktree)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| RunnerError::SpawnFailed(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| RunnerError::SpawnFailed(e.to_string()))?;
            // Closing stdin signals end-of-prompt
            drop(stdin);
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::SpawnFailed("no stdout pipe".to_string()))?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(ResponseChunk::text(line)).await.is_err() {
                    return;
                }
            }
            let chunk = match child.wait().await {
                Ok(status) if status.success() => ResponseChunk::done(),
                Ok(status) => ResponseChunk::failed(format!("assistant exited with {status}")),
                Err(e) => ResponseChunk::failed(e.to_string()),
            };
            let _ = tx.send(chunk).await;
        });

        Ok(rx)
    }

    fn take_channels(&mut self) -> RunnerChannels {
        RunnerChannels::default()
    }
}

/// Factory spawning [`CommandRunner`]s in each session's worktree.
#[derive(Clone)]
pub struct CommandRunnerFactory {
    command: String,
}

impl CommandRunnerFactory {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl RunnerFactory for CommandRunnerFactory {
    type Runner = CommandRunner;

    fn create(&self, session: &Session) -> Result<CommandRunner, RunnerError> {
        Ok(CommandRunner {
            command: self.command.clone(),
            worktree: session.worktree.clone(),
        })
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
