// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler: the daemon's periodic tick.
//!
//! Each tick performs exactly, in order: collect completed workers,
//! process shelved items, poll issue sources, start queued items, persist
//! state. The scheduler owns the concurrency budget; all adapter IO
//! happens between store transitions, never under the store mutex.

use crate::automerge::{check, MergeAction, PrPoll};
use crate::registry::{SessionRegistry, WorkerRegistry};
use crate::prompts;
use crate::worker::{
    create_pr_for_session, CompletionStrategy, SessionWorker, WorkerLimits, WorkerSeed,
};
use chrono::{DateTime, Utc};
use plural_adapters::{
    HostAdapter, IssueProvider, PrState, ReviewDecision, RunnerFactory, SessionBackend,
};
use plural_core::{
    Clock, IssueSource, SessionState, WorkItem, WorkItemId, WorkItemState, WorkflowPolicy,
};
use plural_storage::{save_state, SnapshotError, StoreError, WorkItemStore};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// How long shutdown waits for each worker to exit.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(30);

/// Errors that abort a tick (adapter failures never do; they are logged
/// and retried on the next tick).
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Static scheduler configuration, resolved by the daemon at startup.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Scope identifier this daemon locked on
    pub scope: String,
    /// Repositories matching the scope filter
    pub repos: Vec<PathBuf>,
    /// Path of the persisted state file
    pub state_path: PathBuf,
}

/// The daemon's orchestration core.
pub struct Scheduler<H, F, C>
where
    H: HostAdapter + SessionBackend,
    F: RunnerFactory,
    C: Clock + 'static,
{
    store: Arc<WorkItemStore>,
    sessions: Arc<SessionRegistry>,
    workers: Arc<WorkerRegistry>,
    providers: Vec<Arc<dyn IssueProvider>>,
    host: H,
    factory: F,
    clock: C,
    policy: WorkflowPolicy,
    config: SchedulerConfig,
    started_at: DateTime<Utc>,
    last_poll_at: Option<DateTime<Utc>>,
    last_review_poll: Option<Instant>,
}

impl<H, F, C> Scheduler<H, F, C>
where
    H: HostAdapter + SessionBackend,
    F: RunnerFactory,
    C: Clock + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<WorkItemStore>,
        providers: Vec<Arc<dyn IssueProvider>>,
        host: H,
        factory: F,
        clock: C,
        policy: WorkflowPolicy,
        config: SchedulerConfig,
    ) -> Self {
        let started_at = clock.timestamp();
        Self {
            store,
            sessions: Arc::new(SessionRegistry::new()),
            workers: Arc::new(WorkerRegistry::new()),
            providers,
            host,
            factory,
            clock,
            policy,
            config,
            started_at,
            last_poll_at: None,
            last_review_poll: None,
        }
    }

    pub fn store(&self) -> &Arc<WorkItemStore> {
        &self.store
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Whether any spawned worker is still registered (used by `--once`).
    pub fn has_workers(&self) -> bool {
        !self.workers.is_empty()
    }

    /// One scheduler tick, in the fixed phase order.
    pub async fn tick(&mut self) -> Result<(), SchedulerError> {
        self.collect_completed().await;
        self.process_shelved().await;
        self.poll_sources().await;
        self.start_queued().await;
        self.persist()?;
        Ok(())
    }

    /// Cancel every worker, wait out the drain deadline, persist, exit.
    pub async fn shutdown(&mut self) {
        info!("scheduler shutting down");
        self.workers.cancel_all();
        self.workers.drain(SHUTDOWN_DRAIN).await;
        if let Err(e) = self.persist() {
            warn!(error = %e, "failed to persist state during shutdown");
        }
    }

    fn provider_for(&self, source: IssueSource) -> Option<Arc<dyn IssueProvider>> {
        self.providers
            .iter()
            .find(|provider| provider.source() == source)
            .cloned()
    }

    fn slot_free(&self) -> bool {
        self.store.active_slots() < self.policy.max_concurrent as usize
    }

    // ----- phase 1: collect completed workers -----

    async fn collect_completed(&mut self) {
        for (item_id, session_id) in self.workers.collect_completed() {
            let Some(item) = self.store.get(&item_id) else {
                warn!(item = %item_id, "completed worker for unknown work item");
                continue;
            };
            match item.state {
                WorkItemState::Coding => self.handle_coding_complete(&item, &session_id).await,
                WorkItemState::AddressingFeedback => {
                    self.handle_feedback_complete(&item, &session_id).await
                }
                state => {
                    warn!(item = %item_id, state = %state, "completed worker for item in unexpected state");
                }
            }
        }
    }

    async fn handle_coding_complete(&mut self, item: &WorkItem, session_id: &plural_core::SessionId) {
        let Some(session_state) = self.sessions.get(session_id) else {
            self.fail_item(&item.id, "session lost before completion").await;
            return;
        };
        let flags = session_state.flags();
        let session = session_state.snapshot();

        if flags.pr_created {
            let pr_url = session.pr_url.clone();
            let _ = self.store.update(&item.id, |it| {
                it.pr_url = pr_url.clone();
                Ok(())
            });
            if let Some(url) = &pr_url {
                self.broadcast_pr(item, url);
            }
            if flags.pr_merged {
                // The assistant created and merged the PR through tool
                // calls; run the whole shortcut chain
                let _ = self.store.update(&item.id, |it| {
                    it.cascade(
                        &[
                            WorkItemState::PrCreated,
                            WorkItemState::AwaitingReview,
                            WorkItemState::AwaitingCi,
                            WorkItemState::Merging,
                            WorkItemState::Completed,
                        ],
                        &self.clock,
                    )
                });
                self.finish_session(item, true).await;
            } else {
                let _ = self.store.update(&item.id, |it| {
                    it.cascade(
                        &[WorkItemState::PrCreated, WorkItemState::AwaitingReview],
                        &self.clock,
                    )
                });
            }
            return;
        }

        // No PR yet: create one on the session's behalf
        let link_text = self
            .provider_for(item.issue.source)
            .map(|provider| provider.pr_link_text(&item.issue))
            .unwrap_or_default();
        let title = prompts::pr_title(&item.issue);
        let body = prompts::pr_body(&item.issue, &link_text);

        match create_pr_for_session(&self.host, &session, &title, &body).await {
            Ok(url) => {
                session_state.mark_pr_created(&url);
                let _ = self.store.update(&item.id, |it| {
                    it.pr_url = Some(url.clone());
                    it.cascade(
                        &[WorkItemState::PrCreated, WorkItemState::AwaitingReview],
                        &self.clock,
                    )
                });
                self.broadcast_pr(item, &url);
            }
            Err(e) => {
                self.fail_item(&item.id, format!("PR creation failed: {e}")).await;
            }
        }
    }

    async fn handle_feedback_complete(
        &mut self,
        item: &WorkItem,
        session_id: &plural_core::SessionId,
    ) {
        let Some(session_state) = self.sessions.get(session_id) else {
            self.fail_item(&item.id, "session lost before push").await;
            return;
        };
        let session = session_state.snapshot();

        if let Err(e) = self
            .store
            .transition(&item.id, WorkItemState::Pushing, &self.clock)
        {
            warn!(item = %item.id, error = %e, "cannot enter pushing state");
            return;
        }

        let push_result = match self.host.push_updates(&session).await {
            Ok(stream) => plural_adapters::drain_stream(stream).await.map(|_| ()),
            Err(e) => Err(e),
        };

        match push_result {
            Ok(()) => {
                let _ = self
                    .store
                    .transition(&item.id, WorkItemState::AwaitingReview, &self.clock);
            }
            Err(e) => {
                self.fail_item(&item.id, format!("push failed: {e}")).await;
            }
        }
    }

    // ----- phase 2: process shelved items -----

    async fn process_shelved(&mut self) {
        self.process_awaiting_review().await;
        self.process_awaiting_ci().await;
    }

    /// Rate-limited to one pass per `review_poll_interval`, which is
    /// coarser than the main tick.
    async fn process_awaiting_review(&mut self) {
        let due = match self.last_review_poll {
            None => true,
            Some(last) => {
                self.clock.now().duration_since(last) >= self.policy.review_poll_interval
            }
        };
        if !due {
            return;
        }

        let items = self.store.in_state(WorkItemState::AwaitingReview);
        if items.is_empty() {
            return;
        }
        self.last_review_poll = Some(self.clock.now());

        // One batch query per repo covers every shelved branch
        let mut by_repo: HashMap<PathBuf, Vec<WorkItem>> = HashMap::new();
        for item in items {
            by_repo.entry(item.repo_path.clone()).or_default().push(item);
        }

        for (repo, items) in by_repo {
            let branches: Vec<String> =
                items.iter().filter_map(|item| item.branch.clone()).collect();
            let snapshots = match self.host.batch_pr_states(&repo, &branches).await {
                Ok(snapshots) => snapshots,
                Err(e) => {
                    debug!(error = %e, repo = %repo.display(), "review poll failed");
                    continue;
                }
            };

            for item in items {
                let Some(branch) = item.branch.clone() else {
                    continue;
                };
                let Some(snapshot) = snapshots.get(&branch).copied() else {
                    continue;
                };

                match snapshot.state {
                    PrState::Closed => {
                        info!(item = %item.id, "PR closed externally; abandoning");
                        let _ = self
                            .store
                            .transition(&item.id, WorkItemState::Abandoned, &self.clock);
                        self.finish_session(&item, false).await;
                    }
                    PrState::Merged => {
                        info!(item = %item.id, "PR merged externally; completing");
                        let _ = self.store.update(&item.id, |it| {
                            it.cascade(
                                &[
                                    WorkItemState::AwaitingCi,
                                    WorkItemState::Merging,
                                    WorkItemState::Completed,
                                ],
                                &self.clock,
                            )
                        });
                        self.finish_session(&item, true).await;
                    }
                    PrState::NotFound => {
                        debug!(item = %item.id, branch = %branch, "no PR found for shelved item");
                    }
                    PrState::Open => {
                        self.process_open_review(&item, &repo, &branch, snapshot.comment_count)
                            .await;
                    }
                }
            }
        }
    }

    async fn process_open_review(
        &mut self,
        item: &WorkItem,
        repo: &std::path::Path,
        branch: &str,
        comment_count: u32,
    ) {
        let wants_feedback = self.policy.auto_address_comments
            && comment_count > item.comments_addressed
            && item.feedback_rounds < self.policy.max_feedback_rounds;

        if wants_feedback {
            // Deferred when no slot is free; the item stays shelved and is
            // retried on the next review pass
            if !self.slot_free() {
                debug!(item = %item.id, "feedback deferred: no free slot");
                return;
            }
            self.start_feedback_round(item, repo, branch, comment_count).await;
            return;
        }

        match self.host.review_decision(repo, branch).await {
            Ok(ReviewDecision::Approved) => {
                let _ = self
                    .store
                    .transition(&item.id, WorkItemState::AwaitingCi, &self.clock);
            }
            Ok(_) => {}
            Err(e) => {
                debug!(item = %item.id, error = %e, "review decision query failed");
            }
        }
    }

    async fn start_feedback_round(
        &mut self,
        item: &WorkItem,
        repo: &std::path::Path,
        branch: &str,
        comment_count: u32,
    ) {
        let Some(session_id) = item.session_id.clone() else {
            self.fail_item(&item.id, "no session for feedback round").await;
            return;
        };
        let Some(session_state) = self.sessions.get(&session_id) else {
            self.fail_item(&item.id, "session lost before feedback round").await;
            return;
        };

        let new_comments = comment_count.saturating_sub(item.comments_addressed);
        let comments = match self.host.fetch_review_comments(repo, branch).await {
            Ok(comments) => comments,
            Err(e) => {
                debug!(item = %item.id, error = %e, "comment fetch failed; retrying next pass");
                return;
            }
        };

        if let Err(e) = self.store.update(&item.id, |it| {
            it.begin_feedback_round(comment_count, &self.clock)
        }) {
            warn!(item = %item.id, error = %e, "cannot start feedback round");
            return;
        }
        session_state.note_comments(comment_count);

        info!(
            item = %item.id,
            new_comments,
            round = item.feedback_rounds + 1,
            "starting feedback round"
        );
        let prompt = prompts::feedback_prompt(new_comments, &comments);
        self.spawn_worker(&item.id, session_state, prompt).await;
    }

    async fn process_awaiting_ci(&mut self) {
        for item in self.store.in_state(WorkItemState::AwaitingCi) {
            let Some(branch) = item.branch.clone() else {
                continue;
            };
            let ci = match self.host.check_status(&item.repo_path, &branch).await {
                Ok(ci) => ci,
                Err(e) => {
                    debug!(item = %item.id, error = %e, "CI status query failed");
                    continue;
                }
            };

            // Same pure check as the in-worker machine; review is already
            // settled for items in awaiting_ci, so Stop here means CI failed
            let action = check(
                &PrPoll {
                    state: PrState::Open,
                    comment_count: item.comments_addressed,
                    review: ReviewDecision::Approved,
                    ci,
                },
                item.comments_addressed,
                false,
            );

            match action {
                MergeAction::Merge => {
                    if !self.policy.auto_merge {
                        continue;
                    }
                    self.merge_item(&item, &branch).await;
                }
                MergeAction::Stop => self.apply_ci_failure_policy(&item).await,
                MergeAction::Continue | MergeAction::AddressComments { .. } => {}
            }
        }
    }

    async fn merge_item(&mut self, item: &WorkItem, branch: &str) {
        if let Err(e) = self
            .store
            .transition(&item.id, WorkItemState::Merging, &self.clock)
        {
            warn!(item = %item.id, error = %e, "cannot enter merging state");
            return;
        }

        match self
            .host
            .merge_pr(&item.repo_path, branch, true, self.policy.merge_method)
            .await
        {
            Ok(()) => {
                info!(item = %item.id, branch = %branch, "merged PR");
                let _ = self
                    .store
                    .transition(&item.id, WorkItemState::Completed, &self.clock);
                self.finish_session(item, true).await;
            }
            Err(e) => {
                self.fail_item(&item.id, format!("merge failed: {e}")).await;
            }
        }
    }

    async fn apply_ci_failure_policy(&mut self, item: &WorkItem) {
        match self.policy.on_ci_failure {
            plural_core::CiFailurePolicy::Retry => {
                info!(item = %item.id, "CI failed; returning to review per policy");
                let _ = self
                    .store
                    .transition(&item.id, WorkItemState::AwaitingReview, &self.clock);
            }
            plural_core::CiFailurePolicy::Notify => {
                self.fail_item(&item.id, "CI checks failed").await;
            }
            plural_core::CiFailurePolicy::Abandon => {
                info!(item = %item.id, "CI failed; abandoning per policy");
                let _ = self
                    .store
                    .transition(&item.id, WorkItemState::Abandoned, &self.clock);
                self.finish_session(item, false).await;
            }
        }
    }

    // ----- phase 3: poll sources -----

    async fn poll_sources(&mut self) {
        // Backpressure: skip intake entirely while the budget is spoken for
        let committed = self.store.active_slots() + self.store.queued_count();
        if committed >= self.policy.max_concurrent as usize {
            debug!(committed, "skipping poll: concurrency budget exhausted");
            return;
        }

        let mut inflight = self.store.non_terminal_keys();
        inflight.extend(self.sessions.issue_keys());

        for repo in self.config.repos.clone() {
            for provider in self.providers.clone() {
                if !provider.is_configured(&repo).await {
                    continue;
                }
                let issues = match provider.fetch(&repo).await {
                    Ok(issues) => issues,
                    Err(e) => {
                        debug!(
                            source = %provider.source(),
                            repo = %repo.display(),
                            error = %e,
                            "issue poll failed"
                        );
                        continue;
                    }
                };

                for issue in issues {
                    let key = issue.key();
                    if inflight.contains(&key) {
                        continue;
                    }
                    let item = WorkItem::new(issue.clone(), repo.clone(), &self.clock);
                    let item_id = item.id.clone();
                    match self.store.insert(item) {
                        Ok(()) => {
                            info!(item = %item_id, source = %issue.source, "new work item");
                            inflight.insert(key);
                            if issue.source == IssueSource::Github {
                                // Label swap + intake comment are fire-and-
                                // forget; failure never fails the item
                                let provider = Arc::clone(&provider);
                                let repo = repo.clone();
                                tokio::spawn(async move {
                                    if let Err(e) =
                                        provider.mark_in_progress(&repo, &issue).await
                                    {
                                        debug!(error = %e, "intake label swap failed");
                                    }
                                });
                            }
                        }
                        Err(e) => debug!(item = %item_id, error = %e, "skipping fetched issue"),
                    }
                }
            }
        }

        self.last_poll_at = Some(self.clock.timestamp());
    }

    // ----- phase 4: start queued items -----

    async fn start_queued(&mut self) {
        while self.slot_free() {
            let mut queued = self.store.in_state(WorkItemState::Queued);
            queued.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            let Some(item) = queued.into_iter().next() else {
                break;
            };

            let Some(provider) = self.provider_for(item.issue.source) else {
                self.fail_item(&item.id, "no provider configured for issue source")
                    .await;
                continue;
            };

            let branch = provider.branch_name(&item.issue);
            match self.host.branch_exists(&item.repo_path, &branch).await {
                Ok(true) => {
                    self.fail_item(&item.id, format!("branch {branch} already exists"))
                        .await;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    // Transient: leave the item queued for the next tick
                    debug!(item = %item.id, error = %e, "branch probe failed");
                    break;
                }
            }

            let base_branch = match self.host.default_branch(&item.repo_path).await {
                Ok(base) => base,
                Err(e) => {
                    debug!(item = %item.id, error = %e, "default branch probe failed");
                    break;
                }
            };

            let session = match self
                .host
                .create_session(plural_adapters::NewSession {
                    repo_path: item.repo_path.clone(),
                    branch: branch.clone(),
                    base_branch,
                    issue: Some(item.issue.clone()),
                    supervisor_id: None,
                })
                .await
            {
                Ok(session) => session,
                Err(e) => {
                    self.fail_item(&item.id, format!("session creation failed: {e}"))
                        .await;
                    continue;
                }
            };

            let session_state = SessionState::new(session.clone());
            self.sessions.register(Arc::clone(&session_state));

            let session_id = session.id.clone();
            if let Err(e) = self.store.update(&item.id, |it| {
                it.session_id = Some(session_id.clone());
                it.branch = Some(branch.clone());
                it.transition(WorkItemState::Coding, &self.clock)
            }) {
                warn!(item = %item.id, error = %e, "cannot start queued item");
                self.sessions.remove(&session.id);
                continue;
            }

            info!(item = %item.id, branch = %branch, session = %session.id, "starting work item");
            let prompt =
                prompts::initial_prompt(&item.issue, &provider.pr_link_text(&item.issue));
            self.spawn_worker(&item.id, session_state, prompt).await;
        }
    }

    /// Spawn a daemon-managed worker for an item's session.
    async fn spawn_worker(
        &mut self,
        item_id: &WorkItemId,
        session_state: Arc<SessionState>,
        prompt: String,
    ) {
        let session = session_state.snapshot();
        let runner = match self.factory.create(&session) {
            Ok(runner) => runner,
            Err(e) => {
                self.fail_item(item_id, format!("assistant start failed: {e}")).await;
                return;
            }
        };

        let link_text = session
            .issue
            .as_ref()
            .and_then(|issue| {
                self.provider_for(issue.source)
                    .map(|provider| provider.pr_link_text(issue))
            })
            .unwrap_or_default();

        let worker = SessionWorker::spawn(WorkerSeed {
            session: Arc::clone(&session_state),
            sessions: Arc::clone(&self.sessions),
            workers: Arc::clone(&self.workers),
            host: self.host.clone(),
            factory: self.factory.clone(),
            runner,
            initial_prompt: prompt,
            pr_link_text: link_text,
            limits: WorkerLimits::from(&self.policy),
            strategy: CompletionStrategy::DaemonManaged,
            policy: self.policy.clone(),
            clock: self.clock.clone(),
        });
        self.workers.register(item_id.clone(), session.id, worker);
    }

    // ----- phase 5: persist -----

    fn persist(&self) -> Result<(), SchedulerError> {
        let file =
            self.store
                .to_state_file(&self.config.scope, self.started_at, self.last_poll_at);
        save_state(&self.config.state_path, &file)?;
        Ok(())
    }

    // ----- shared helpers -----

    /// Post the PR link on the originating issue (fire-and-forget).
    fn broadcast_pr(&self, item: &WorkItem, pr_url: &str) {
        if !self.policy.auto_broadcast_pr {
            return;
        }
        let Some(provider) = self.provider_for(item.issue.source) else {
            return;
        };
        let repo = item.repo_path.clone();
        let issue = item.issue.clone();
        let pr_url = pr_url.to_string();
        tokio::spawn(async move {
            if let Err(e) = provider.announce_pr(&repo, &issue, &pr_url).await {
                debug!(error = %e, "PR broadcast failed");
            }
        });
    }

    async fn fail_item(&mut self, item_id: &WorkItemId, message: impl Into<String>) {
        let message = message.into();
        warn!(item = %item_id, error = %message, "work item failed");
        match self.store.record_failure(item_id, message, &self.clock) {
            Ok(item) => self.finish_session(&item, false).await,
            Err(e) => warn!(item = %item_id, error = %e, "could not record failure"),
        }
    }

    /// Drop a terminal item's session and run best-effort completion side
    /// effects (worktree cleanup, WIP label removal for merged items).
    async fn finish_session(&mut self, item: &WorkItem, merged: bool) {
        if let Some(session_id) = &item.session_id {
            if let Some(session_state) = self.sessions.get(session_id) {
                if merged {
                    session_state.mark_pr_merged();
                    let session = session_state.snapshot();
                    if let Err(e) = self.host.remove_worktree(&session).await {
                        debug!(error = %e, "worktree cleanup failed");
                    }
                }
                self.sessions.remove(session_id);
            }
        }

        if merged {
            if let Some(provider) = self.provider_for(item.issue.source) {
                let repo = item.repo_path.clone();
                let issue = item.issue.clone();
                tokio::spawn(async move {
                    if let Err(e) = provider.mark_done(&repo, &issue).await {
                        debug!(error = %e, "work-in-progress label removal failed");
                    }
                });
            }
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
