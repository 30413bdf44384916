// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon environment-variable overrides.

use std::path::PathBuf;

/// State directory override (`PLURAL_STATE_DIR`), falling back to the XDG
/// state dir (`~/.local/state/plural`).
pub fn state_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("PLURAL_STATE_DIR") {
        return Some(PathBuf::from(dir));
    }
    dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/state")))
        .map(|dir| dir.join("plural"))
}

/// Assistant command override (`PLURAL_ASSISTANT_CMD`).
///
/// The command receives each prompt on stdin and streams its output on
/// stdout, once per turn.
pub fn assistant_command() -> String {
    std::env::var("PLURAL_ASSISTANT_CMD").unwrap_or_else(|_| "claude -p".to_string())
}
