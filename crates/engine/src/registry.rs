// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session and worker registries.
//!
//! [`SessionRegistry`] is the shared map of live session state, including
//! supervisor/child relationships. [`WorkerRegistry`] tracks every spawned
//! worker (work-item workers and child workers) so the scheduler can sweep
//! completions and shutdown can cancel and drain them all. Both hold their
//! mutex only for map access, never across IO.

use crate::worker::SessionWorker;
use parking_lot::Mutex;
use plural_core::issue::IssueKey;
use plural_core::{SessionId, SessionState, WorkItemId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Shared registry of live sessions and their parent/child links.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Arc<SessionState>>>,
    children: Mutex<HashMap<SessionId, Vec<SessionId>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, state: Arc<SessionState>) {
        self.sessions.lock().insert(state.id(), state);
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<SessionState>> {
        self.sessions.lock().get(id).cloned()
    }

    pub fn remove(&self, id: &SessionId) {
        self.sessions.lock().remove(id);
        self.children.lock().remove(id);
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Link a child session under its supervisor.
    pub fn register_child(&self, supervisor: &SessionId, child: &SessionId) {
        self.children
            .lock()
            .entry(supervisor.clone())
            .or_default()
            .push(child.clone());
    }

    pub fn child_ids_of(&self, supervisor: &SessionId) -> Vec<SessionId> {
        self.children
            .lock()
            .get(supervisor)
            .cloned()
            .unwrap_or_default()
    }

    pub fn children_of(&self, supervisor: &SessionId) -> Vec<Arc<SessionState>> {
        let ids = self.child_ids_of(supervisor);
        let sessions = self.sessions.lock();
        ids.iter().filter_map(|id| sessions.get(id).cloned()).collect()
    }

    /// Children whose workers have not yet finished.
    pub fn live_children_of(&self, supervisor: &SessionId) -> Vec<Arc<SessionState>> {
        self.children_of(supervisor)
            .into_iter()
            .filter(|child| !child.is_completed())
            .collect()
    }

    /// Issue keys of all registered sessions, for intake deduplication.
    pub fn issue_keys(&self) -> HashSet<IssueKey> {
        self.sessions
            .lock()
            .values()
            .filter_map(|state| state.snapshot().issue.map(|issue| issue.key()))
            .collect()
    }
}

struct WorkerEntry {
    /// Work item this worker advances; `None` for child-session workers.
    item_id: Option<WorkItemId>,
    worker: SessionWorker,
}

/// Registry of spawned workers, keyed by session.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: Mutex<HashMap<SessionId, WorkerEntry>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, item_id: WorkItemId, session_id: SessionId, worker: SessionWorker) {
        self.workers.lock().insert(
            session_id,
            WorkerEntry {
                item_id: Some(item_id),
                worker,
            },
        );
    }

    pub fn register_child(&self, session_id: SessionId, worker: SessionWorker) {
        self.workers.lock().insert(
            session_id,
            WorkerEntry {
                item_id: None,
                worker,
            },
        );
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.workers.lock().contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.workers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.lock().is_empty()
    }

    /// Sweep finished workers out of the registry.
    ///
    /// Returns `(work item, session)` for each finished work-item worker;
    /// finished child workers are dropped silently (their completion is
    /// reported through the supervisor's pending message).
    pub fn collect_completed(&self) -> Vec<(WorkItemId, SessionId)> {
        let mut workers = self.workers.lock();
        let done_ids: Vec<SessionId> = workers
            .iter()
            .filter(|(_, entry)| entry.worker.is_done())
            .map(|(id, _)| id.clone())
            .collect();

        let mut completed = Vec::new();
        for session_id in done_ids {
            if let Some(entry) = workers.remove(&session_id) {
                if let Some(item_id) = entry.item_id {
                    completed.push((item_id, session_id));
                }
            }
        }
        completed
    }

    /// Signal every worker to stop.
    pub fn cancel_all(&self) {
        for entry in self.workers.lock().values() {
            entry.worker.cancel();
        }
    }

    /// Wait for all workers to exit, bounded by `timeout` per worker.
    pub async fn drain(&self, timeout: Duration) {
        let entries: Vec<WorkerEntry> = {
            let mut workers = self.workers.lock();
            workers.drain().map(|(_, entry)| entry).collect()
        };
        for mut entry in entries {
            if tokio::time::timeout(timeout, entry.worker.wait())
                .await
                .is_err()
            {
                tracing::warn!("worker did not stop within the shutdown deadline");
            }
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
