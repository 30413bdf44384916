// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auto-merge decision logic and its in-worker driver.
//!
//! The three-stage check (unaddressed comments, review decision, CI
//! status) lives in one pure function, [`check`]. Two drivers execute it:
//! the scheduler's durable `awaiting_ci` path on each tick, and
//! [`AutoMerge`], the sleep-based loop a standalone worker spawns after
//! its PR exists.

use crate::prompts;
use plural_adapters::{
    CiStatus, HostAdapter, PrState, ReviewDecision, SessionBackend,
};
use plural_core::{SessionState, WorkflowPolicy};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Observations about a PR gathered for one check iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrPoll {
    pub state: PrState,
    pub comment_count: u32,
    pub review: ReviewDecision,
    pub ci: CiStatus,
}

/// What the machine should do with the current observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    /// New review comments above the high-watermark; feed them back to the
    /// session and stop until the next round completes
    AddressComments { count: u32 },
    /// Approved and green: merge now
    Merge,
    /// Nothing actionable yet; poll again
    Continue,
    /// Terminal for this machine: merged/closed externally, CI failed, or
    /// attempts exhausted without a decision
    Stop,
}

/// The shared three-stage check, short-circuiting in order:
/// comments, review decision, CI status.
pub fn check(poll: &PrPoll, comments_addressed: u32, attempts_exhausted: bool) -> MergeAction {
    // A PR that is gone or already resolved ends the machine
    if !matches!(poll.state, PrState::Open) {
        return MergeAction::Stop;
    }

    if poll.comment_count > comments_addressed {
        return MergeAction::AddressComments {
            count: poll.comment_count,
        };
    }

    match poll.review {
        ReviewDecision::ChangesRequested => return MergeAction::Continue,
        ReviewDecision::None => {
            return if attempts_exhausted {
                MergeAction::Stop
            } else {
                MergeAction::Continue
            };
        }
        ReviewDecision::Approved => {}
    }

    match poll.ci {
        CiStatus::Pass | CiStatus::None => MergeAction::Merge,
        CiStatus::Fail => MergeAction::Stop,
        CiStatus::Pending => MergeAction::Continue,
    }
}

/// In-task auto-merge driver for standalone workers.
///
/// Bounded polling: up to `merge_max_attempts` iterations of
/// `merge_poll_interval`. Exhausting attempts leaves the PR open for an
/// operator; nothing is failed.
pub struct AutoMerge<H> {
    session: Arc<SessionState>,
    host: H,
    policy: WorkflowPolicy,
    cancel_rx: watch::Receiver<bool>,
}

impl<H: HostAdapter + SessionBackend> AutoMerge<H> {
    pub fn new(
        session: Arc<SessionState>,
        host: H,
        policy: WorkflowPolicy,
        cancel_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            session,
            host,
            policy,
            cancel_rx,
        }
    }

    pub async fn run(mut self) {
        let branch = self.session.branch();
        for attempt in 0..self.policy.merge_max_attempts {
            tokio::select! {
                _ = tokio::time::sleep(self.policy.merge_poll_interval) => {}
                _ = self.cancel_rx.changed() => return,
            }

            let session = self.session.snapshot();
            let snapshot = match self
                .host
                .batch_pr_states(&session.repo_path, &[branch.clone()])
                .await
            {
                Ok(mut map) => match map.remove(&branch) {
                    Some(snapshot) => snapshot,
                    None => continue,
                },
                Err(e) => {
                    debug!(error = %e, branch = %branch, "auto-merge state query failed");
                    continue;
                }
            };

            // Record externally resolved PRs on the session before deciding
            match snapshot.state {
                PrState::Merged => {
                    self.session.mark_pr_merged();
                    return;
                }
                PrState::Closed => {
                    self.session.mark_pr_closed();
                    return;
                }
                PrState::NotFound => return,
                PrState::Open => {}
            }

            let addressed = self.session.comments_addressed();
            let exhausted = attempt + 1 >= self.policy.merge_max_attempts;

            // Stage the adapter calls: review/CI are only fetched once the
            // comment stage passes
            let action = if snapshot.comment_count > addressed {
                check(
                    &PrPoll {
                        state: PrState::Open,
                        comment_count: snapshot.comment_count,
                        review: ReviewDecision::None,
                        ci: CiStatus::None,
                    },
                    addressed,
                    exhausted,
                )
            } else {
                let review = match self
                    .host
                    .review_decision(&session.repo_path, &branch)
                    .await
                {
                    Ok(review) => review,
                    Err(e) => {
                        debug!(error = %e, "auto-merge review query failed");
                        continue;
                    }
                };
                let ci = match self.host.check_status(&session.repo_path, &branch).await {
                    Ok(ci) => ci,
                    Err(e) => {
                        debug!(error = %e, "auto-merge CI query failed");
                        continue;
                    }
                };
                check(
                    &PrPoll {
                        state: PrState::Open,
                        comment_count: snapshot.comment_count,
                        review,
                        ci,
                    },
                    addressed,
                    exhausted,
                )
            };

            match action {
                MergeAction::AddressComments { count } => {
                    self.address_comments(&session.repo_path, &branch, count).await;
                    return;
                }
                MergeAction::Merge => {
                    self.merge(&session.repo_path, &branch).await;
                    return;
                }
                MergeAction::Continue => {}
                MergeAction::Stop => return,
            }
        }
        info!(branch = %branch, "auto-merge attempts exhausted; leaving PR open");
    }

    /// Queue the new comments as a pending message; the worker's main loop
    /// picks it up and re-invokes the machine after the next round.
    async fn address_comments(&self, repo: &std::path::Path, branch: &str, count: u32) {
        let new_comments = count.saturating_sub(self.session.comments_addressed());
        self.session.note_comments(count);
        let comments = match self.host.fetch_review_comments(repo, branch).await {
            Ok(comments) => comments,
            Err(e) => {
                warn!(error = %e, "failed to fetch review comments for auto-merge round");
                Vec::new()
            }
        };
        self.session
            .set_pending_message(prompts::feedback_prompt(new_comments, &comments));
    }

    async fn merge(&self, repo: &std::path::Path, branch: &str) {
        match self
            .host
            .merge_pr(repo, branch, true, self.policy.merge_method)
            .await
        {
            Ok(()) => {
                info!(branch = %branch, "auto-merged PR");
                self.session.mark_pr_merged();
                let session = self.session.snapshot();
                if let Err(e) = self.host.remove_worktree(&session).await {
                    debug!(error = %e, "worktree cleanup after merge failed");
                }
            }
            Err(e) => {
                warn!(error = %e, branch = %branch, "auto-merge failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "automerge_tests.rs"]
mod tests;
