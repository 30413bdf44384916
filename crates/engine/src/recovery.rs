// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash recovery: reconcile loaded state with external reality.
//!
//! Runs once at startup, after the state file is loaded and before the
//! first tick. Items that were mid-flight when the previous daemon died
//! are probed against the host and moved to a state the tick loop can
//! make progress from. Recovery is idempotent: a second run over the same
//! probes reaches the same states.

use plural_adapters::{HostAdapter, PrState, SessionBackend};
use plural_core::{Clock, WorkItem, WorkItemState};
use plural_storage::WorkItemStore;
use tracing::{debug, info, warn};

/// Reconcile every non-terminal work item after a restart.
pub async fn recover<H, C>(store: &WorkItemStore, host: &H, clock: &C)
where
    H: HostAdapter + SessionBackend,
    C: Clock,
{
    let mut recovered = 0usize;
    for item in store.items() {
        if item.is_terminal() {
            continue;
        }
        recovered += 1;
        match item.state {
            // The tick loop handles these as-is
            WorkItemState::Queued
            | WorkItemState::AwaitingReview
            | WorkItemState::AwaitingCi => {}

            WorkItemState::Coding | WorkItemState::PrCreated => {
                recover_in_flight(store, host, clock, &item).await;
            }

            // The round was interrupted; the next review pass re-detects
            // unaddressed comments and starts a fresh round
            WorkItemState::AddressingFeedback | WorkItemState::Pushing => {
                let _ = store.update(&item.id, |it| {
                    it.transition(WorkItemState::AwaitingReview, clock)
                });
            }

            WorkItemState::Merging => {
                recover_merging(store, host, clock, &item).await;
            }

            WorkItemState::Completed | WorkItemState::Failed | WorkItemState::Abandoned => {}
        }
    }
    if recovered > 0 {
        info!(items = recovered, "recovery pass complete");
    }
}

/// An item that was coding (or had just created its PR) when the daemon
/// died. The PR probe decides where it resumes.
async fn recover_in_flight<H, C>(store: &WorkItemStore, host: &H, clock: &C, item: &WorkItem)
where
    H: HostAdapter + SessionBackend,
    C: Clock,
{
    let Some(branch) = item.branch.clone() else {
        // Crashed before a session was ever bound; start over
        let _ = store.update(&item.id, |it| it.transition(WorkItemState::Queued, clock));
        return;
    };

    let pr_state = host
        .pr_state(&item.repo_path, &branch)
        .await
        .unwrap_or_else(|e| {
            debug!(item = %item.id, error = %e, "recovery PR probe failed; assuming no PR");
            PrState::NotFound
        });

    match pr_state {
        PrState::Open => {
            info!(item = %item.id, "recovered: PR open, awaiting review");
            let _ = store.update(&item.id, |it| {
                let mut path = Vec::new();
                if it.state == WorkItemState::Coding {
                    path.push(WorkItemState::PrCreated);
                }
                path.push(WorkItemState::AwaitingReview);
                it.cascade(&path, clock)
            });
        }
        PrState::Merged => {
            info!(item = %item.id, "recovered: PR already merged, completing");
            let _ = store.update(&item.id, |it| {
                let mut path = Vec::new();
                if it.state == WorkItemState::Coding {
                    path.push(WorkItemState::PrCreated);
                }
                path.extend([
                    WorkItemState::AwaitingReview,
                    WorkItemState::AwaitingCi,
                    WorkItemState::Merging,
                    WorkItemState::Completed,
                ]);
                it.cascade(&path, clock)
            });
        }
        PrState::Closed => {
            info!(item = %item.id, "recovered: PR closed externally, abandoning");
            let _ = store.update(&item.id, |it| {
                let mut path = Vec::new();
                if it.state == WorkItemState::Coding {
                    path.push(WorkItemState::PrCreated);
                }
                path.extend([WorkItemState::AwaitingReview, WorkItemState::Abandoned]);
                it.cascade(&path, clock)
            });
        }
        PrState::NotFound => {
            // No PR was ever created. A branch still on disk is a session
            // we cannot reattach to; a clean slate can be requeued.
            let branch_on_disk = host
                .branch_exists(&item.repo_path, &branch)
                .await
                .unwrap_or(false);
            if branch_on_disk {
                warn!(item = %item.id, branch = %branch, "recovered: session lost");
                let _ = store.record_failure(&item.id, "session lost during recovery", clock);
            } else {
                info!(item = %item.id, "recovered: no PR and no branch, requeueing");
                let _ = store.update(&item.id, |it| {
                    it.session_id = None;
                    it.branch = None;
                    it.transition(WorkItemState::Queued, clock)
                });
            }
        }
    }
}

/// A merge was in flight. Only a confirmed merge completes the item; any
/// other observation falls back to `awaiting_ci`, the conservative branch,
/// and the tick loop re-drives the merge.
async fn recover_merging<H, C>(store: &WorkItemStore, host: &H, clock: &C, item: &WorkItem)
where
    H: HostAdapter + SessionBackend,
    C: Clock,
{
    let merged = match &item.branch {
        Some(branch) => matches!(
            host.pr_state(&item.repo_path, branch).await,
            Ok(PrState::Merged)
        ),
        None => false,
    };

    if merged {
        info!(item = %item.id, "recovered: merge had completed");
        let _ = store.update(&item.id, |it| it.transition(WorkItemState::Completed, clock));
    } else {
        info!(item = %item.id, "recovered: merge unconfirmed, awaiting CI again");
        let _ = store.update(&item.id, |it| {
            it.transition(WorkItemState::AwaitingCi, clock)
        });
    }
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
