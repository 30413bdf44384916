// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child sessions spawned by a supervisor's tool calls.
//!
//! A child is a full session branched off the supervisor's branch, driven
//! by its own worker. Completion is reported through the supervisor's
//! pending-message slot; the supervisor wait in the worker loop keeps the
//! supervisor alive until all children finish.

use crate::prompts;
use crate::registry::{SessionRegistry, WorkerRegistry};
use crate::worker::{CompletionStrategy, SessionWorker, WorkerError, WorkerLimits, WorkerSeed};
use plural_adapters::{ChildInfo, HostAdapter, NewSession, RunnerFactory, SessionBackend};
use plural_core::{Clock, Session, SessionId, SessionState, WorkflowPolicy};
use std::sync::Arc;
use tracing::{info, warn};

/// Create and start a child session for a supervisor.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn create_child<H, F, C>(
    sessions: &Arc<SessionRegistry>,
    workers: &Arc<WorkerRegistry>,
    host: &H,
    factory: &F,
    clock: &C,
    parent: &Arc<SessionState>,
    task: &str,
    policy: &WorkflowPolicy,
    strategy: CompletionStrategy,
) -> Result<ChildInfo, WorkerError>
where
    H: HostAdapter + SessionBackend,
    F: RunnerFactory,
    C: Clock + 'static,
{
    let parent_session = parent.snapshot();
    let index = sessions.child_ids_of(&parent_session.id).len() + 1;
    let timestamp = clock.timestamp().format("%Y%m%d-%H%M%S");
    let branch = format!("{}-child-{index}-{timestamp}", parent_session.branch);

    let session = host
        .create_session(NewSession {
            repo_path: parent_session.repo_path.clone(),
            branch: branch.clone(),
            base_branch: parent_session.branch.clone(),
            issue: None,
            supervisor_id: Some(parent_session.id.clone()),
        })
        .await?;

    let state = SessionState::new(session.clone());
    sessions.register(Arc::clone(&state));
    sessions.register_child(&parent_session.id, &session.id);

    let runner = factory.create(&session)?;
    let worker = SessionWorker::spawn(WorkerSeed {
        session: state,
        sessions: Arc::clone(sessions),
        workers: Arc::clone(workers),
        host: host.clone(),
        factory: factory.clone(),
        runner,
        initial_prompt: prompts::child_task_prompt(task),
        pr_link_text: String::new(),
        limits: WorkerLimits::from(policy),
        strategy,
        policy: policy.clone(),
        clock: clock.clone(),
    });
    workers.register_child(session.id.clone(), worker);

    info!(
        supervisor = %parent_session.id,
        child = %session.id,
        branch = %branch,
        "spawned child session"
    );

    Ok(ChildInfo {
        session_id: session.id,
        branch,
    })
}

/// Queue a completion notification on the supervisor's pending-message
/// slot. Only the latest update matters, so overwriting is intentional.
pub(crate) fn notify_supervisor(
    sessions: &SessionRegistry,
    supervisor_id: &SessionId,
    child: &Session,
) {
    let children = sessions.children_of(supervisor_id);
    let total = children.len();
    // The completing child notifies before its completed flag flips, so it
    // is excluded from the running count explicitly
    let running = children
        .iter()
        .filter(|state| state.id() != child.id && !state.is_completed())
        .count();

    let message = if running == 0 {
        prompts::all_children_complete(total)
    } else {
        prompts::child_progress(&child.branch, running, total)
    };

    match sessions.get(supervisor_id) {
        Some(supervisor) => supervisor.set_pending_message(message),
        None => warn!(
            supervisor = %supervisor_id,
            "child completed but its supervisor session is gone"
        ),
    }
}

#[cfg(test)]
#[path = "children_tests.rs"]
mod tests;
