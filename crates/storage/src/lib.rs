// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! plural-storage: durable daemon state.
//!
//! The work-item registry, its atomic on-disk snapshot, and the per-scope
//! advisory lock that keeps two daemons from working the same repositories.

pub mod lock;
pub mod snapshot;
pub mod state;

pub use lock::{LockError, ScopeLock};
pub use snapshot::{load_state, save_state, SnapshotError};
pub use state::{DaemonStateFile, StoreError, WorkItemStore, STATE_VERSION};
