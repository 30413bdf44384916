// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::state::WorkItemStore;
use plural_core::{Clock, FakeClock, IssueRef, IssueSource, WorkItem};

fn sample_state(clock: &FakeClock) -> DaemonStateFile {
    let store = WorkItemStore::new();
    store
        .insert(
            WorkItem::builder()
                .issue(IssueRef::new(IssueSource::Github, "7", "t", "u"))
                .build(clock),
        )
        .unwrap();
    store.to_state_file("/tmp/repo", clock.timestamp(), Some(clock.timestamp()))
}

#[test]
fn save_and_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let clock = FakeClock::new();
    let state = sample_state(&clock);

    save_state(&path, &state).unwrap();
    let loaded = load_state(&path).unwrap().unwrap();

    assert_eq!(loaded.version, STATE_VERSION);
    assert_eq!(loaded.repo_path, "/tmp/repo");
    assert_eq!(loaded.work_items, state.work_items);
    assert_eq!(loaded.last_poll_at, state.last_poll_at);
}

#[test]
fn load_missing_file_is_none() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_state(&dir.path().join("state.json")).unwrap().is_none());
}

#[test]
fn version_mismatch_resets_to_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let clock = FakeClock::new();
    let mut state = sample_state(&clock);
    state.version = 1;

    // Write the stale-schema file directly
    std::fs::write(&path, serde_json::to_string(&state).unwrap()).unwrap();

    assert!(load_state(&path).unwrap().is_none());
    // The stale file is left in place; the next save overwrites it
    assert!(path.exists());
}

#[test]
fn corrupt_file_is_rotated_to_bak() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(load_state(&path).unwrap().is_none());
    assert!(!path.exists());
    assert!(path.with_extension("bak").exists());
}

#[test]
fn save_is_atomic_over_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let clock = FakeClock::new();

    let state = sample_state(&clock);
    save_state(&path, &state).unwrap();
    save_state(&path, &state).unwrap();

    // No stray temp file left behind
    assert!(!path.with_extension("tmp").exists());
    assert!(load_state(&path).unwrap().is_some());
}

#[test]
fn bak_rotation_keeps_bounded_backups() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    for _ in 0..5 {
        std::fs::write(&path, "corrupt").unwrap();
        assert!(load_state(&path).unwrap().is_none());
    }

    assert!(path.with_extension("bak").exists());
    assert!(path.with_extension("bak.2").exists());
    assert!(path.with_extension("bak.3").exists());
    assert!(!path.with_extension("bak.4").exists());
}
