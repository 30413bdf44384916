// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State-file persistence for crash recovery.
//!
//! The daemon state is one JSON document, written atomically (temp file,
//! fsync, rename) after every tick. Recovery loads it at startup; a schema
//! version mismatch or a corrupt file resets to empty state rather than
//! failing startup.

use crate::state::{DaemonStateFile, STATE_VERSION};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors that can occur in state-file operations
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Save the state file atomically (write to `.tmp`, fsync, then rename).
///
/// A crash during save leaves the previous file intact.
pub fn save_state(path: &Path, state: &DaemonStateFile) -> Result<(), SnapshotError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("tmp");

    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, state)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
    }

    fs::rename(&tmp_path, path)?;

    Ok(())
}

/// Load the state file if it exists and carries the current schema version.
///
/// Returns `Ok(None)` when the file is missing, corrupt, or written by a
/// different schema version. Corrupt files are moved to a `.bak` so the
/// daemon can start with empty state instead of refusing to run.
pub fn load_state(path: &Path) -> Result<Option<DaemonStateFile>, SnapshotError> {
    if !path.exists() {
        return Ok(None);
    }

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    match serde_json::from_reader::<_, DaemonStateFile>(reader) {
        Ok(state) if state.version == STATE_VERSION => Ok(Some(state)),
        Ok(state) => {
            warn!(
                found = state.version,
                expected = STATE_VERSION,
                path = %path.display(),
                "state file schema version mismatch, resetting to empty state",
            );
            Ok(None)
        }
        Err(e) => {
            let bak_path = rotate_bak_path(path);
            warn!(
                error = %e,
                path = %path.display(),
                bak = %bak_path.display(),
                "Corrupt state file, moving to .bak and starting fresh",
            );
            fs::rename(path, &bak_path)?;
            Ok(None)
        }
    }
}

const MAX_BAK_FILES: u32 = 3;

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
///
/// Keeps up to [`MAX_BAK_FILES`] backups: `.bak`, `.bak.2`, `.bak.3`.
/// The oldest backup is removed when the limit is reached.
pub(crate) fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    // Remove the oldest if at capacity
    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }

    // Shift existing backups up by one
    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }

    bak(1)
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
