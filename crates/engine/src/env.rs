// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine env-var overrides (test hooks).

use std::time::Duration;

/// Supervisor idle wait between child-session checks.
///
/// Override with `PLURAL_SUPERVISOR_WAIT_MS`. Default: 5000ms.
pub(crate) fn supervisor_wait() -> Duration {
    std::env::var("PLURAL_SUPERVISOR_WAIT_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}
