// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake adapters for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::host::{
    CiStatus, EventStream, HostAdapter, HostError, NewSession, PrSnapshot, PrState,
    ReviewComment, ReviewDecision, SessionBackend, StreamEvent,
};
use crate::provider::{IssueProvider, ProviderError};
use crate::runner::{
    AssistantRunner, CreateChildRequest, CreatePrRequest, ListChildrenRequest,
    MergeChildRequest, PermissionRequest, PlanApprovalRequest, PushBranchRequest,
    QuestionRequest, ResponseChunk, ReviewCommentsRequest, RunnerChannels, RunnerError,
    RunnerFactory,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use plural_core::{IssueRef, IssueSource, MergeMethod, Session, SessionFlags, SessionId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Recorded call to [`FakeHost`].
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    PrState { branch: String },
    ReviewDecision { branch: String },
    CheckStatus { branch: String },
    BatchPrStates { branches: Vec<String> },
    FetchComments { branch: String },
    CreatePr { branch: String },
    PushUpdates { branch: String },
    MergePr { branch: String, method: MergeMethod },
    MergeToParent { child: String, parent: String },
    CreateSession { branch: String },
    RemoveWorktree { branch: String },
}

#[derive(Default)]
struct FakeHostState {
    pr_states: HashMap<String, PrState>,
    review_decisions: HashMap<String, ReviewDecision>,
    ci_statuses: HashMap<String, CiStatus>,
    comment_counts: HashMap<String, u32>,
    comments: HashMap<String, Vec<ReviewComment>>,
    pr_urls: HashMap<String, String>,
    branches: HashSet<String>,
    calls: Vec<HostCall>,
    create_pr_error: Option<String>,
    push_error: Option<String>,
    merge_error: Option<String>,
    next_pr_number: u32,
    next_session_number: u32,
}

/// Programmable host + session backend.
///
/// Query results are looked up per branch; unset branches report
/// `not_found` / `none` / zero comments. All calls are recorded.
#[derive(Clone)]
pub struct FakeHost {
    inner: Arc<Mutex<FakeHostState>>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeHostState {
                next_pr_number: 1,
                next_session_number: 1,
                ..FakeHostState::default()
            })),
        }
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.inner.lock().calls.clone()
    }

    pub fn set_pr_state(&self, branch: &str, state: PrState) {
        self.inner.lock().pr_states.insert(branch.to_string(), state);
    }

    pub fn set_review_decision(&self, branch: &str, decision: ReviewDecision) {
        self.inner
            .lock()
            .review_decisions
            .insert(branch.to_string(), decision);
    }

    pub fn set_ci_status(&self, branch: &str, status: CiStatus) {
        self.inner
            .lock()
            .ci_statuses
            .insert(branch.to_string(), status);
    }

    pub fn set_comment_count(&self, branch: &str, count: u32) {
        self.inner
            .lock()
            .comment_counts
            .insert(branch.to_string(), count);
    }

    pub fn set_comments(&self, branch: &str, comments: Vec<ReviewComment>) {
        let mut inner = self.inner.lock();
        inner
            .comment_counts
            .insert(branch.to_string(), comments.len() as u32);
        inner.comments.insert(branch.to_string(), comments);
    }

    pub fn add_branch(&self, branch: &str) {
        self.inner.lock().branches.insert(branch.to_string());
    }

    pub fn pr_url(&self, branch: &str) -> Option<String> {
        self.inner.lock().pr_urls.get(branch).cloned()
    }

    pub fn set_create_pr_error(&self, error: impl Into<String>) {
        self.inner.lock().create_pr_error = Some(error.into());
    }

    pub fn set_push_error(&self, error: impl Into<String>) {
        self.inner.lock().push_error = Some(error.into());
    }

    pub fn set_merge_error(&self, error: impl Into<String>) {
        self.inner.lock().merge_error = Some(error.into());
    }

    fn record(&self, call: HostCall) {
        self.inner.lock().calls.push(call);
    }
}

async fn ok_stream(lines: Vec<String>) -> EventStream {
    let (tx, rx) = mpsc::channel(lines.len() + 1);
    for line in lines {
        let _ = tx.send(StreamEvent::line(line)).await;
    }
    let _ = tx.send(StreamEvent::done()).await;
    rx
}

async fn failed_stream(error: String) -> EventStream {
    let (tx, rx) = mpsc::channel(1);
    let _ = tx.send(StreamEvent::failed(error)).await;
    rx
}

#[async_trait]
impl HostAdapter for FakeHost {
    async fn pr_state(&self, _repo: &Path, branch: &str) -> Result<PrState, HostError> {
        self.record(HostCall::PrState {
            branch: branch.to_string(),
        });
        Ok(self
            .inner
            .lock()
            .pr_states
            .get(branch)
            .copied()
            .unwrap_or(PrState::NotFound))
    }

    async fn review_decision(
        &self,
        _repo: &Path,
        branch: &str,
    ) -> Result<ReviewDecision, HostError> {
        self.record(HostCall::ReviewDecision {
            branch: branch.to_string(),
        });
        Ok(self
            .inner
            .lock()
            .review_decisions
            .get(branch)
            .copied()
            .unwrap_or(ReviewDecision::None))
    }

    async fn check_status(&self, _repo: &Path, branch: &str) -> Result<CiStatus, HostError> {
        self.record(HostCall::CheckStatus {
            branch: branch.to_string(),
        });
        Ok(self
            .inner
            .lock()
            .ci_statuses
            .get(branch)
            .copied()
            .unwrap_or(CiStatus::None))
    }

    async fn batch_pr_states(
        &self,
        _repo: &Path,
        branches: &[String],
    ) -> Result<HashMap<String, PrSnapshot>, HostError> {
        self.record(HostCall::BatchPrStates {
            branches: branches.to_vec(),
        });
        let inner = self.inner.lock();
        Ok(branches
            .iter()
            .map(|branch| {
                (
                    branch.clone(),
                    PrSnapshot {
                        state: inner
                            .pr_states
                            .get(branch)
                            .copied()
                            .unwrap_or(PrState::NotFound),
                        comment_count: inner
                            .comment_counts
                            .get(branch)
                            .copied()
                            .unwrap_or(0),
                    },
                )
            })
            .collect())
    }

    async fn fetch_review_comments(
        &self,
        _repo: &Path,
        branch: &str,
    ) -> Result<Vec<ReviewComment>, HostError> {
        self.record(HostCall::FetchComments {
            branch: branch.to_string(),
        });
        Ok(self
            .inner
            .lock()
            .comments
            .get(branch)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_pr(
        &self,
        session: &Session,
        _title: &str,
        _body: &str,
    ) -> Result<EventStream, HostError> {
        self.record(HostCall::CreatePr {
            branch: session.branch.clone(),
        });
        let error = self.inner.lock().create_pr_error.clone();
        if let Some(error) = error {
            return Ok(failed_stream(error).await);
        }
        let url = {
            let mut inner = self.inner.lock();
            let number = inner.next_pr_number;
            inner.next_pr_number += 1;
            let url = format!("https://example.test/pr/{number}");
            inner.pr_states.insert(session.branch.clone(), PrState::Open);
            inner.pr_urls.insert(session.branch.clone(), url.clone());
            url
        };
        Ok(ok_stream(vec!["Creating pull request".to_string(), url]).await)
    }

    async fn push_updates(&self, session: &Session) -> Result<EventStream, HostError> {
        self.record(HostCall::PushUpdates {
            branch: session.branch.clone(),
        });
        let error = self.inner.lock().push_error.clone();
        match error {
            Some(error) => Ok(failed_stream(error).await),
            None => Ok(ok_stream(vec!["Everything up-to-date".to_string()]).await),
        }
    }

    async fn merge_pr(
        &self,
        _repo: &Path,
        branch: &str,
        _delete_branch: bool,
        method: MergeMethod,
    ) -> Result<(), HostError> {
        self.record(HostCall::MergePr {
            branch: branch.to_string(),
            method,
        });
        let mut inner = self.inner.lock();
        if let Some(error) = inner.merge_error.clone() {
            return Err(HostError::CommandFailed(error));
        }
        inner.pr_states.insert(branch.to_string(), PrState::Merged);
        Ok(())
    }

    async fn merge_to_parent(
        &self,
        child: &Session,
        parent: &Session,
        _message: &str,
    ) -> Result<EventStream, HostError> {
        self.record(HostCall::MergeToParent {
            child: child.branch.clone(),
            parent: parent.branch.clone(),
        });
        Ok(ok_stream(vec!["Merge made by the 'ort' strategy.".to_string()]).await)
    }
}

#[async_trait]
impl SessionBackend for FakeHost {
    async fn create_session(&self, spec: NewSession) -> Result<Session, HostError> {
        self.record(HostCall::CreateSession {
            branch: spec.branch.clone(),
        });
        let id = {
            let mut inner = self.inner.lock();
            if inner.branches.contains(&spec.branch) {
                return Err(HostError::BranchExists(spec.branch));
            }
            inner.branches.insert(spec.branch.clone());
            let number = inner.next_session_number;
            inner.next_session_number += 1;
            SessionId::new(format!("sess-{number}"))
        };
        Ok(Session {
            worktree: PathBuf::from(format!("/tmp/fake-worktrees/{id}")),
            id,
            repo_path: spec.repo_path,
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

    async fn branch_exists(&self, _repo: &Path, branch: &str) -> Result<bool, HostError> {
        Ok(self.inner.lock().branches.contains(branch))
    }

    async fn default_branch(&self, _repo: &Path) -> Result<String, HostError> {
        Ok("main".to_string())
    }

    async fn remove_worktree(&self, session: &Session) -> Result<(), HostError> {
        self.record(HostCall::RemoveWorktree {
            branch: session.branch.clone(),
        });
        Ok(())
    }
}

/// Recorded call to [`FakeProvider`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCall {
    Fetch,
    MarkInProgress { issue_id: String },
    MarkDone { issue_id: String },
    AnnouncePr { issue_id: String, pr_url: String },
}

struct FakeProviderState {
    polls: VecDeque<Vec<IssueRef>>,
    calls: Vec<ProviderCall>,
    configured: bool,
    mark_error: Option<String>,
}

/// Scripted issue source: each fetch pops the next poll result.
#[derive(Clone)]
pub struct FakeProvider {
    source: IssueSource,
    inner: Arc<Mutex<FakeProviderState>>,
}

impl FakeProvider {
    pub fn new(source: IssueSource) -> Self {
        Self {
            source,
            inner: Arc::new(Mutex::new(FakeProviderState {
                polls: VecDeque::new(),
                calls: Vec::new(),
                configured: true,
                mark_error: None,
            })),
        }
    }

    /// Queue the result of the next fetch.
    pub fn push_poll(&self, issues: Vec<IssueRef>) {
        self.inner.lock().polls.push_back(issues);
    }

    pub fn set_configured(&self, configured: bool) {
        self.inner.lock().configured = configured;
    }

    /// Make `mark_in_progress` fail (best-effort side effect testing).
    pub fn set_mark_error(&self, error: impl Into<String>) {
        self.inner.lock().mark_error = Some(error.into());
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.inner.lock().calls.clone()
    }
}

#[async_trait]
impl IssueProvider for FakeProvider {
    fn source(&self) -> IssueSource {
        self.source
    }

    async fn is_configured(&self, _repo: &Path) -> bool {
        self.inner.lock().configured
    }

    async fn fetch(&self, _repo: &Path) -> Result<Vec<IssueRef>, ProviderError> {
        let mut inner = self.inner.lock();
        inner.calls.push(ProviderCall::Fetch);
        Ok(inner.polls.pop_front().unwrap_or_default())
    }

    fn pr_link_text(&self, issue: &IssueRef) -> String {
        match self.source {
            IssueSource::Github => format!("Fixes #{}", issue.id),
            _ => String::new(),
        }
    }

    async fn mark_in_progress(
        &self,
        _repo: &Path,
        issue: &IssueRef,
    ) -> Result<(), ProviderError> {
        let mut inner = self.inner.lock();
        inner.calls.push(ProviderCall::MarkInProgress {
            issue_id: issue.id.clone(),
        });
        match inner.mark_error.clone() {
            Some(error) => Err(ProviderError::CommandFailed(error)),
            None => Ok(()),
        }
    }

    async fn mark_done(&self, _repo: &Path, issue: &IssueRef) -> Result<(), ProviderError> {
        let mut inner = self.inner.lock();
        inner.calls.push(ProviderCall::MarkDone {
            issue_id: issue.id.clone(),
        });
        match inner.mark_error.clone() {
            Some(error) => Err(ProviderError::CommandFailed(error)),
            None => Ok(()),
        }
    }

    async fn announce_pr(
        &self,
        _repo: &Path,
        issue: &IssueRef,
        pr_url: &str,
    ) -> Result<(), ProviderError> {
        let mut inner = self.inner.lock();
        inner.calls.push(ProviderCall::AnnouncePr {
            issue_id: issue.id.clone(),
            pr_url: pr_url.to_string(),
        });
        Ok(())
    }
}

/// Senders a test holds to inject tool-call requests into a running worker.
#[derive(Clone)]
pub struct FakeRunnerHandle {
    prompts: Arc<Mutex<Vec<String>>>,
    turn_tx: Arc<Mutex<Option<mpsc::Sender<ResponseChunk>>>>,
    pub permission_tx: mpsc::Sender<PermissionRequest>,
    pub question_tx: mpsc::Sender<QuestionRequest>,
    pub plan_approval_tx: mpsc::Sender<PlanApprovalRequest>,
    pub create_child_tx: mpsc::Sender<CreateChildRequest>,
    pub list_children_tx: mpsc::Sender<ListChildrenRequest>,
    pub merge_child_tx: mpsc::Sender<MergeChildRequest>,
    pub create_pr_tx: mpsc::Sender<CreatePrRequest>,
    pub push_branch_tx: mpsc::Sender<PushBranchRequest>,
    pub review_comments_tx: mpsc::Sender<ReviewCommentsRequest>,
}

impl FakeRunnerHandle {
    /// Prompts sent to the runner so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    /// Send an extra chunk into the current turn's response stream.
    pub async fn send_chunk(&self, chunk: ResponseChunk) {
        let tx = self.turn_tx.lock().clone();
        if let Some(tx) = tx {
            let _ = tx.send(chunk).await;
        }
    }
}

/// Scripted assistant runner.
///
/// Each `send_prompt` pops the next scripted turn and streams its chunks.
/// An exhausted script yields a bare `done` chunk so workers terminate.
pub struct FakeRunner {
    scripts: VecDeque<Vec<ResponseChunk>>,
    channels: Option<RunnerChannels>,
    handle: FakeRunnerHandle,
    prompt_error: Option<String>,
}

impl FakeRunner {
    pub fn new(scripts: Vec<Vec<ResponseChunk>>) -> (Self, FakeRunnerHandle) {
        let (permission_tx, permission_rx) = mpsc::channel(8);
        let (question_tx, question_rx) = mpsc::channel(8);
        let (plan_approval_tx, plan_approval_rx) = mpsc::channel(8);
        let (create_child_tx, create_child_rx) = mpsc::channel(8);
        let (list_children_tx, list_children_rx) = mpsc::channel(8);
        let (merge_child_tx, merge_child_rx) = mpsc::channel(8);
        let (create_pr_tx, create_pr_rx) = mpsc::channel(8);
        let (push_branch_tx, push_branch_rx) = mpsc::channel(8);
        let (review_comments_tx, review_comments_rx) = mpsc::channel(8);

        let handle = FakeRunnerHandle {
            prompts: Arc::new(Mutex::new(Vec::new())),
            turn_tx: Arc::new(Mutex::new(None)),
            permission_tx,
            question_tx,
            plan_approval_tx,
            create_child_tx,
            list_children_tx,
            merge_child_tx,
            create_pr_tx,
            push_branch_tx,
            review_comments_tx,
        };

        let runner = Self {
            scripts: scripts.into(),
            channels: Some(RunnerChannels {
                permission: Some(permission_rx),
                question: Some(question_rx),
                plan_approval: Some(plan_approval_rx),
                create_child: Some(create_child_rx),
                list_children: Some(list_children_rx),
                merge_child: Some(merge_child_rx),
                create_pr: Some(create_pr_rx),
                push_branch: Some(push_branch_rx),
                review_comments: Some(review_comments_rx),
            }),
            handle: handle.clone(),
            prompt_error: None,
        };

        (runner, handle)
    }

    /// A runner that exposes no tool channels at all.
    pub fn bare(scripts: Vec<Vec<ResponseChunk>>) -> (Self, FakeRunnerHandle) {
        let (mut runner, handle) = Self::new(scripts);
        runner.channels = Some(RunnerChannels::default());
        (runner, handle)
    }

    /// One turn that immediately completes.
    pub fn single_turn() -> (Self, FakeRunnerHandle) {
        Self::new(vec![vec![ResponseChunk::done()]])
    }

    pub fn set_prompt_error(&mut self, error: impl Into<String>) {
        self.prompt_error = Some(error.into());
    }
}

#[async_trait]
impl AssistantRunner for FakeRunner {
    async fn send_prompt(
        &mut self,
        prompt: &str,
    ) -> Result<mpsc::Receiver<ResponseChunk>, RunnerError> {
        if let Some(error) = self.prompt_error.clone() {
            return Err(RunnerError::Runner(error));
        }
        self.handle.prompts.lock().push(prompt.to_string());

        let chunks = self
            .scripts
            .pop_front()
            .unwrap_or_else(|| vec![ResponseChunk::done()]);
        let (tx, rx) = mpsc::channel(chunks.len().max(1) + 8);
        for chunk in chunks {
            let _ = tx.send(chunk).await;
        }
        // Keep the sender so tests can stream more chunks into this turn
        *self.handle.turn_tx.lock() = Some(tx);
        Ok(rx)
    }

    fn take_channels(&mut self) -> RunnerChannels {
        self.channels.take().unwrap_or_default()
    }
}

#[derive(Default)]
struct FakeRunnerFactoryState {
    queued: VecDeque<FakeRunner>,
    handles: Vec<(String, FakeRunnerHandle)>,
    create_error: Option<String>,
}

/// Factory handing out scripted runners; defaults to single-turn runners.
#[derive(Clone, Default)]
pub struct FakeRunnerFactory {
    inner: Arc<Mutex<FakeRunnerFactoryState>>,
}

impl FakeRunnerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a runner for the next created session.
    pub fn push_runner(&self, runner: FakeRunner) {
        self.inner.lock().queued.push_back(runner);
    }

    pub fn set_create_error(&self, error: impl Into<String>) {
        self.inner.lock().create_error = Some(error.into());
    }

    /// `(session branch, handle)` for every runner created so far.
    pub fn handles(&self) -> Vec<(String, FakeRunnerHandle)> {
        self.inner.lock().handles.clone()
    }
}

impl RunnerFactory for FakeRunnerFactory {
    type Runner = FakeRunner;

    fn create(&self, session: &Session) -> Result<FakeRunner, RunnerError> {
        let mut inner = self.inner.lock();
        if let Some(error) = inner.create_error.clone() {
            return Err(RunnerError::SpawnFailed(error));
        }
        let runner = inner
            .queued
            .pop_front()
            .unwrap_or_else(|| FakeRunner::single_turn().0);
        inner
            .handles
            .push((session.branch.clone(), runner.handle.clone()));
        Ok(runner)
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
