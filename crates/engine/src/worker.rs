// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session worker: one task per active assistant session.
//!
//! A worker owns its assistant for the duration of one coding or feedback
//! round. The loop sends a prompt, multiplexes the response with tool-call
//! requests (see `respond.rs`), enforces turn and duration limits, picks up
//! pending messages, and keeps supervisors alive while children run. The
//! scheduler observes completion by sweeping [`SessionWorker::is_done`] on
//! its next tick; workers never mutate work-item state directly.

use crate::automerge::AutoMerge;
use crate::registry::{SessionRegistry, WorkerRegistry};
use crate::{children, prompts};
use plural_adapters::{
    drain_stream, last_url_line, AssistantRunner, HostAdapter, HostError, RunnerChannels,
    RunnerError, RunnerFactory, SessionBackend,
};
use plural_core::{Clock, Session, SessionId, SessionState, WorkflowPolicy};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Errors surfaced to the assistant from tool-call handling.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("session {0} is not a child of this session")]
    NotAChild(SessionId),
    #[error("unknown child session: {0}")]
    UnknownChild(SessionId),
    #[error("child {0} is already merged")]
    ChildAlreadyMerged(SessionId),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error(transparent)]
    Runner(#[from] RunnerError),
}

/// Per-worker limits, resolved from the workflow policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerLimits {
    pub max_turns: u32,
    pub max_duration: Duration,
}

impl From<&WorkflowPolicy> for WorkerLimits {
    fn from(policy: &WorkflowPolicy) -> Self {
        Self {
            max_turns: policy.max_turns,
            max_duration: policy.max_duration,
        }
    }
}

/// Who closes out a session when its worker finishes.
///
/// Under the daemon the scheduler creates the PR and drives merging from
/// durable state; a standalone worker does both itself. Chosen at
/// construction; the loop never consults a global flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStrategy {
    /// The scheduler handles PR creation and auto-merge on its next tick.
    DaemonManaged,
    /// The worker creates the PR itself and spawns the in-task auto-merge
    /// machine when enabled.
    Standalone,
}

/// Everything a worker needs at construction.
pub struct WorkerSeed<H, F: RunnerFactory, C> {
    pub session: Arc<SessionState>,
    pub sessions: Arc<SessionRegistry>,
    pub workers: Arc<WorkerRegistry>,
    pub host: H,
    pub factory: F,
    pub runner: F::Runner,
    pub initial_prompt: String,
    /// Issue link text for PRs this worker creates (standalone mode)
    pub pr_link_text: String,
    pub limits: WorkerLimits,
    pub strategy: CompletionStrategy,
    pub policy: WorkflowPolicy,
    pub clock: C,
}

/// Handle to a spawned worker task.
pub struct SessionWorker {
    done: Arc<AtomicBool>,
    cancel_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl SessionWorker {
    /// Spawn the worker task for a seed.
    pub fn spawn<H, F, C>(seed: WorkerSeed<H, F, C>) -> Self
    where
        H: HostAdapter + SessionBackend,
        F: RunnerFactory,
        C: Clock + 'static,
    {
        let done = Arc::new(AtomicBool::new(false));
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let mut runner = seed.runner;
        let channels = runner.take_channels();
        let worker_loop = WorkerLoop {
            session: seed.session,
            sessions: seed.sessions,
            workers: seed.workers,
            host: seed.host,
            factory: seed.factory,
            runner,
            channels,
            initial_prompt: seed.initial_prompt,
            pr_link_text: seed.pr_link_text,
            limits: seed.limits,
            strategy: seed.strategy,
            policy: seed.policy,
            clock: seed.clock,
            cancel_rx,
            done: Arc::clone(&done),
        };

        // Boxed so a worker can spawn child workers of the same type
        // without the task future containing itself
        let fut: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(worker_loop.run());
        let handle = tokio::spawn(fut);

        Self {
            done,
            cancel_tx,
            handle: Some(handle),
        }
    }

    /// Signal the worker task to exit at its next suspension point.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Block until the worker task exits.
    pub async fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    /// Non-blocking completion check, sweepable by the scheduler.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

/// Why the main loop exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExitReason {
    /// No pending work left
    Finished,
    /// Turn or duration limit reached
    LimitReached,
    /// Cancelled from outside
    Cancelled,
    /// Unrecoverable runner error
    RunnerError,
}

pub(crate) struct WorkerLoop<H, F: RunnerFactory, C> {
    pub(crate) session: Arc<SessionState>,
    pub(crate) sessions: Arc<SessionRegistry>,
    pub(crate) workers: Arc<WorkerRegistry>,
    pub(crate) host: H,
    pub(crate) factory: F,
    pub(crate) runner: F::Runner,
    pub(crate) channels: RunnerChannels,
    pub(crate) initial_prompt: String,
    pub(crate) pr_link_text: String,
    pub(crate) limits: WorkerLimits,
    pub(crate) strategy: CompletionStrategy,
    pub(crate) policy: WorkflowPolicy,
    pub(crate) clock: C,
    pub(crate) cancel_rx: watch::Receiver<bool>,
    pub(crate) done: Arc<AtomicBool>,
}

impl<H, F, C> WorkerLoop<H, F, C>
where
    H: HostAdapter + SessionBackend,
    F: RunnerFactory,
    C: Clock + 'static,
{
    pub(crate) async fn run(mut self) {
        let session_id = self.session.id();
        self.session.mark_started();

        let reason = self.run_loop().await;
        debug!(session_id = %session_id, reason = ?reason, "worker loop exited");

        // Supervisor notification happens before the completed flag flips:
        // a supervisor that observes this session as finished must already
        // find the pending message in its slot
        if reason != ExitReason::Cancelled {
            self.handle_completion().await;
        }

        self.session.mark_completed();
        self.done.store(true, Ordering::Release);
    }

    async fn run_loop(&mut self) -> ExitReason {
        let started = self.clock.now();
        let mut turns: u32 = 0;
        let mut prompt = self.initial_prompt.clone();

        'session: loop {
            let mut stream = match self.runner.send_prompt(&prompt).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "failed to send prompt to assistant");
                    return ExitReason::RunnerError;
                }
            };

            match self.process_one_response(&mut stream).await {
                crate::respond::ResponseOutcome::Completed => {
                    turns += 1;
                }
                crate::respond::ResponseOutcome::Cancelled => {
                    return ExitReason::Cancelled;
                }
                crate::respond::ResponseOutcome::Failed => {
                    return ExitReason::RunnerError;
                }
            }

            if turns >= self.limits.max_turns {
                info!(turns, "worker reached turn limit");
                return ExitReason::LimitReached;
            }
            if self.clock.now().duration_since(started) >= self.limits.max_duration {
                info!("worker reached duration limit");
                return ExitReason::LimitReached;
            }

            loop {
                if let Some(message) = self.session.take_pending_message() {
                    prompt = message;
                    continue 'session;
                }

                if self.has_live_children() {
                    let mut cancel_rx = self.cancel_rx.clone();
                    tokio::select! {
                        _ = tokio::time::sleep(crate::env::supervisor_wait()) => {}
                        _ = cancel_rx.changed() => return ExitReason::Cancelled,
                    }
                    continue;
                }

                return ExitReason::Finished;
            }
        }
    }

    fn has_live_children(&self) -> bool {
        !self
            .sessions
            .live_children_of(&self.session.id())
            .is_empty()
    }

    fn is_supervisor(&self) -> bool {
        !self.sessions.child_ids_of(&self.session.id()).is_empty()
    }

    async fn handle_completion(&mut self) {
        let session = self.session.snapshot();

        // A child reports to its supervisor and is done; the supervisor
        // merges its branch
        if let Some(supervisor_id) = session.supervisor_id.clone() {
            children::notify_supervisor(&self.sessions, &supervisor_id, &session);
            return;
        }

        match self.strategy {
            CompletionStrategy::DaemonManaged => {
                // The scheduler picks this up on its next tick
            }
            CompletionStrategy::Standalone => {
                self.standalone_completion(&session).await;
            }
        }
    }

    async fn standalone_completion(&mut self, session: &Session) {
        let flags = self.session.flags();
        if !flags.pr_created && !self.is_supervisor() {
            let issue_title = session
                .issue
                .as_ref()
                .map(prompts::pr_title)
                .unwrap_or_else(|| format!("Changes on {}", session.branch));
            let body = session
                .issue
                .as_ref()
                .map(|issue| prompts::pr_body(issue, &self.pr_link_text))
                .unwrap_or_default();
            match create_pr_for_session(&self.host, session, &issue_title, &body).await {
                Ok(url) => {
                    info!(url = %url, "created PR for completed session");
                    self.session.mark_pr_created(&url);
                }
                Err(e) => {
                    warn!(error = %e, "PR creation after session completion failed");
                }
            }
        }

        let flags = self.session.flags();
        if flags.pr_created && !flags.pr_merged && !flags.pr_closed && self.policy.auto_merge {
            let machine = AutoMerge::new(
                Arc::clone(&self.session),
                self.host.clone(),
                self.policy.clone(),
                self.cancel_rx.clone(),
            );
            tokio::spawn(machine.run());
        }
    }
}

/// Create a PR for a session and return its URL (the stream's last
/// URL-looking line).
pub async fn create_pr_for_session<H: HostAdapter>(
    host: &H,
    session: &Session,
    title: &str,
    body: &str,
) -> Result<String, HostError> {
    let stream = host.create_pr(session, title, body).await?;
    let lines = drain_stream(stream).await?;
    last_url_line(&lines)
        .ok_or_else(|| HostError::Parse("PR creation output contained no URL".to_string()))
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
