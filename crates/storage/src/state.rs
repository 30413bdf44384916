// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Work-item registry and the persisted daemon state schema.
//!
//! [`WorkItemStore`] is the process-wide registry keyed by work item id.
//! All state transitions are linearised through its mutex; the lock is held
//! only for map lookups and assignments, never across IO.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use plural_core::issue::IssueKey;
use plural_core::{Clock, StateError, WorkItem, WorkItemId, WorkItemState};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Persisted schema version. A mismatch on load forces a reset to empty.
pub const STATE_VERSION: u32 = 2;

/// On-disk daemon state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStateFile {
    pub version: u32,
    /// Scope identifier the daemon locked on (path or `owner/name`)
    pub repo_path: String,
    #[serde(default)]
    pub work_items: HashMap<WorkItemId, WorkItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_poll_at: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
}

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("work item not found: {0}")]
    NotFound(WorkItemId),
    #[error("a non-terminal work item already exists for issue {0}")]
    DuplicateIssue(IssueKey),
    #[error(transparent)]
    State(#[from] StateError),
}

/// Process-wide registry of work items.
#[derive(Default)]
pub struct WorkItemStore {
    items: Mutex<HashMap<WorkItemId, WorkItem>>,
}

impl WorkItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a loaded state file.
    pub fn from_items(items: HashMap<WorkItemId, WorkItem>) -> Self {
        Self {
            items: Mutex::new(items),
        }
    }

    /// Register a new work item.
    ///
    /// Rejects the insert when a non-terminal item already exists for the
    /// same `(source, external id)` pair.
    pub fn insert(&self, item: WorkItem) -> Result<(), StoreError> {
        let mut items = self.items.lock();
        let key = item.issue.key();
        let duplicate = items
            .values()
            .any(|existing| !existing.is_terminal() && existing.issue.key() == key);
        if duplicate {
            return Err(StoreError::DuplicateIssue(key));
        }
        items.insert(item.id.clone(), item);
        Ok(())
    }

    pub fn get(&self, id: &WorkItemId) -> Option<WorkItem> {
        self.items.lock().get(id).cloned()
    }

    /// Mutate one item under the store mutex.
    ///
    /// The closure must not perform IO; all adapter calls happen between
    /// transitions, outside the lock. On error the item is unchanged.
    pub fn update<F>(&self, id: &WorkItemId, f: F) -> Result<WorkItem, StoreError>
    where
        F: FnOnce(&mut WorkItem) -> Result<(), StateError>,
    {
        let mut items = self.items.lock();
        let item = items
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        f(item)?;
        Ok(item.clone())
    }

    /// Transition one item, linearised through the store mutex.
    pub fn transition(
        &self,
        id: &WorkItemId,
        to: WorkItemState,
        clock: &impl Clock,
    ) -> Result<WorkItem, StoreError> {
        self.update(id, |item| item.transition(to, clock))
    }

    pub fn record_failure(
        &self,
        id: &WorkItemId,
        message: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<WorkItem, StoreError> {
        let message = message.into();
        self.update(id, move |item| item.record_failure(message, clock))
    }

    /// All items, cloned out of the lock.
    pub fn items(&self) -> Vec<WorkItem> {
        self.items.lock().values().cloned().collect()
    }

    pub fn in_state(&self, state: WorkItemState) -> Vec<WorkItem> {
        self.items
            .lock()
            .values()
            .filter(|item| item.state == state)
            .cloned()
            .collect()
    }

    /// Items awaiting external events (`awaiting_review`, `awaiting_ci`).
    pub fn shelved(&self) -> Vec<WorkItem> {
        self.items
            .lock()
            .values()
            .filter(|item| item.state.is_shelved())
            .cloned()
            .collect()
    }

    /// Number of items currently consuming a concurrency slot.
    pub fn active_slots(&self) -> usize {
        self.items
            .lock()
            .values()
            .filter(|item| item.state.holds_slot())
            .count()
    }

    pub fn queued_count(&self) -> usize {
        self.items
            .lock()
            .values()
            .filter(|item| item.state == WorkItemState::Queued)
            .count()
    }

    /// Dedup keys of every non-terminal item.
    pub fn non_terminal_keys(&self) -> HashSet<IssueKey> {
        self.items
            .lock()
            .values()
            .filter(|item| !item.is_terminal())
            .map(|item| item.issue.key())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Snapshot the registry into the persisted schema.
    pub fn to_state_file(
        &self,
        repo_path: &str,
        started_at: DateTime<Utc>,
        last_poll_at: Option<DateTime<Utc>>,
    ) -> DaemonStateFile {
        DaemonStateFile {
            version: STATE_VERSION,
            repo_path: repo_path.to_string(),
            work_items: self.items.lock().clone(),
            last_poll_at,
            started_at,
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
