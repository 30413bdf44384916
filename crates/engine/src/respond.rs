// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Response multiplexing: the worker's suspension point.
//!
//! `process_one_response` waits on the whole set of sources at once:
//! cancellation, the assistant's response stream, and every tool-call
//! request channel the runner exposes. Channels the runner does not expose
//! are `None` and never become ready, so they cannot busy-loop the worker.

use crate::automerge::AutoMerge;
use crate::children;
use crate::worker::{CompletionStrategy, WorkerError, WorkerLoop};
use plural_adapters::{
    drain_stream, ChildSessionState, ChildStatus, CreateChildRequest, CreatePrRequest,
    HostAdapter, ListChildrenRequest, MergeChildRequest, PermissionRequest,
    PermissionResponse, PlanApprovalRequest, PushBranchRequest, QuestionRequest,
    ResponseChunk, ReviewCommentsRequest, RunnerFactory, SessionBackend,
};
use plural_core::Clock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Outcome of pumping one assistant response to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResponseOutcome {
    /// The response finished; the loop counts a turn and continues
    Completed,
    /// Cancelled from outside
    Cancelled,
    /// The stream reported an unrecoverable runner error
    Failed,
}

/// Receive from an optional channel; a `None` or closed channel suspends
/// forever instead of spinning.
async fn next_request<T>(slot: &mut Option<mpsc::Receiver<T>>) -> T {
    loop {
        match slot {
            Some(rx) => match rx.recv().await {
                Some(request) => return request,
                // Runner dropped this channel; stop selecting on it
                None => *slot = None,
            },
            None => std::future::pending::<()>().await,
        }
    }
}

/// What woke the multiplex up.
enum Woken {
    Cancelled,
    Chunk(Option<ResponseChunk>),
    Permission(PermissionRequest),
    Question(QuestionRequest),
    PlanApproval(PlanApprovalRequest),
    CreateChild(CreateChildRequest),
    ListChildren(ListChildrenRequest),
    MergeChild(MergeChildRequest),
    CreatePr(CreatePrRequest),
    PushBranch(PushBranchRequest),
    ReviewComments(ReviewCommentsRequest),
}

impl<H, F, C> WorkerLoop<H, F, C>
where
    H: HostAdapter + SessionBackend,
    F: RunnerFactory,
    C: Clock + 'static,
{
    /// Pump one response stream to completion, servicing tool-call
    /// requests as they arrive. Never blocks on a single source.
    pub(crate) async fn process_one_response(
        &mut self,
        stream: &mut mpsc::Receiver<ResponseChunk>,
    ) -> ResponseOutcome {
        loop {
            let woken = {
                let channels = &mut self.channels;
                tokio::select! {
                    _ = self.cancel_rx.changed() => Woken::Cancelled,
                    chunk = stream.recv() => Woken::Chunk(chunk),
                    req = next_request(&mut channels.permission) => Woken::Permission(req),
                    req = next_request(&mut channels.question) => Woken::Question(req),
                    req = next_request(&mut channels.plan_approval) => Woken::PlanApproval(req),
                    req = next_request(&mut channels.create_child) => Woken::CreateChild(req),
                    req = next_request(&mut channels.list_children) => Woken::ListChildren(req),
                    req = next_request(&mut channels.merge_child) => Woken::MergeChild(req),
                    req = next_request(&mut channels.create_pr) => Woken::CreatePr(req),
                    req = next_request(&mut channels.push_branch) => Woken::PushBranch(req),
                    req = next_request(&mut channels.review_comments) => Woken::ReviewComments(req),
                }
            };

            match woken {
                Woken::Cancelled => return ResponseOutcome::Cancelled,
                Woken::Chunk(None) => return ResponseOutcome::Completed,
                Woken::Chunk(Some(chunk)) => {
                    if let Some(error) = chunk.error {
                        warn!(error = %error, "assistant reported an unrecoverable error");
                        return ResponseOutcome::Failed;
                    }
                    if chunk.done {
                        return ResponseOutcome::Completed;
                    }
                    trace!(len = chunk.text.len(), "assistant streaming");
                }
                Woken::Permission(req) => self.handle_permission(req),
                Woken::Question(req) => self.handle_question(req),
                Woken::PlanApproval(req) => self.handle_plan_approval(req),
                Woken::CreateChild(req) => self.handle_create_child(req).await,
                Woken::ListChildren(req) => self.handle_list_children(req),
                Woken::MergeChild(req) => self.handle_merge_child(req).await,
                Woken::CreatePr(req) => self.handle_create_pr(req).await,
                Woken::PushBranch(req) => self.handle_push_branch(req).await,
                Woken::ReviewComments(req) => self.handle_review_comments(req).await,
            }
        }
    }

    /// Headless mode: tools needing human approval are denied with an
    /// explanation the assistant can act on.
    fn handle_permission(&self, req: PermissionRequest) {
        debug!(description = %req.description, "auto-denying permission request");
        let _ = req.reply.send(PermissionResponse {
            allow: false,
            message: "This session runs unattended; the request was denied. \
                      Continue without this tool call."
                .to_string(),
        });
    }

    fn handle_question(&self, req: QuestionRequest) {
        let answers = req
            .questions
            .iter()
            .map(|question| {
                question
                    .options
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "continue as you see fit".to_string())
            })
            .collect();
        let _ = req.reply.send(answers);
    }

    fn handle_plan_approval(&self, req: PlanApprovalRequest) {
        debug!("auto-approving plan");
        let _ = req.reply.send(true);
    }

    async fn handle_create_child(&mut self, req: CreateChildRequest) {
        let result = children::create_child(
            &self.sessions,
            &self.workers,
            &self.host,
            &self.factory,
            &self.clock,
            &self.session,
            &req.task,
            &self.policy,
            self.strategy,
        )
        .await;
        let _ = req.reply.send(result.map_err(|e| e.to_string()));
    }

    fn handle_list_children(&self, req: ListChildrenRequest) {
        let statuses = self
            .sessions
            .children_of(&self.session.id())
            .into_iter()
            .map(|child| {
                let session = child.snapshot();
                let state = if session.flags.pr_merged {
                    ChildSessionState::Merged
                } else if session.flags.pr_created {
                    ChildSessionState::PrCreated
                } else if child.is_completed() {
                    ChildSessionState::Idle
                } else {
                    ChildSessionState::Running
                };
                ChildStatus {
                    session_id: session.id,
                    branch: session.branch,
                    state,
                }
            })
            .collect();
        let _ = req.reply.send(statuses);
    }

    async fn handle_merge_child(&mut self, req: MergeChildRequest) {
        let result = self.merge_child(&req.child).await;
        let _ = req.reply.send(result.map_err(|e| e.to_string()));
    }

    async fn merge_child(
        &mut self,
        child_id: &plural_core::SessionId,
    ) -> Result<(), WorkerError> {
        let my_id = self.session.id();
        if !self.sessions.child_ids_of(&my_id).contains(child_id) {
            return Err(WorkerError::NotAChild(child_id.clone()));
        }
        let child_state = self
            .sessions
            .get(child_id)
            .ok_or_else(|| WorkerError::UnknownChild(child_id.clone()))?;
        let child = child_state.snapshot();
        if child.flags.pr_merged {
            return Err(WorkerError::ChildAlreadyMerged(child_id.clone()));
        }

        let parent = self.session.snapshot();
        let message = format!("Merge child branch {}", child.branch);
        let stream = self.host.merge_to_parent(&child, &parent, &message).await?;
        drain_stream(stream).await?;
        child_state.mark_pr_merged();
        Ok(())
    }

    async fn handle_create_pr(&mut self, req: CreatePrRequest) {
        let session = self.session.snapshot();
        match crate::worker::create_pr_for_session(&self.host, &session, &req.title, &req.body)
            .await
        {
            Ok(url) => {
                self.session.mark_pr_created(&url);
                // Standalone workers start watching the PR right away; under
                // the daemon the scheduler owns this
                if self.strategy == CompletionStrategy::Standalone && self.policy.auto_merge {
                    let machine = AutoMerge::new(
                        Arc::clone(&self.session),
                        self.host.clone(),
                        self.policy.clone(),
                        self.cancel_rx.clone(),
                    );
                    tokio::spawn(machine.run());
                }
                let _ = req.reply.send(Ok(url));
            }
            Err(e) => {
                let _ = req.reply.send(Err(e.to_string()));
            }
        }
    }

    async fn handle_push_branch(&mut self, req: PushBranchRequest) {
        let session = self.session.snapshot();
        let result = match self.host.push_updates(&session).await {
            Ok(stream) => drain_stream(stream).await.map(|_| ()),
            Err(e) => Err(e),
        };
        let _ = req.reply.send(result.map_err(|e| e.to_string()));
    }

    async fn handle_review_comments(&self, req: ReviewCommentsRequest) {
        let session = self.session.snapshot();
        let result = self
            .host
            .fetch_review_comments(&session.repo_path, &session.branch)
            .await;
        let _ = req.reply.send(result.map_err(|e| e.to_string()));
    }
}
