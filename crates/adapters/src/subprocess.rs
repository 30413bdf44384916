// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded subprocess execution.
//!
//! Every host and provider operation shells out to a CLI (`gh`, `git`),
//! and each call class carries its own deadline so one wedged subprocess
//! cannot stall a scheduler tick or a worker. On expiry the child is
//! reaped when its tokio handle drops.

use std::process::Output;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Deadline for PR/branch state queries.
pub const STATE_QUERY_TIMEOUT: Duration = Duration::from_secs(15);

/// Deadline for review-comment fetches.
pub const COMMENT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline for merge operations.
pub const MERGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Deadline for PR creation and branch pushes.
pub const CREATE_PUSH_TIMEOUT: Duration = Duration::from_secs(120);

/// Deadline for git worktree operations.
pub const GIT_WORKTREE_TIMEOUT: Duration = Duration::from_secs(60);

/// Failure modes of a bounded subprocess call.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("{command} did not finish within {}s", deadline.as_secs())]
    DeadlineExpired {
        command: &'static str,
        deadline: Duration,
    },
    #[error("{command} could not be started: {source}")]
    NotStarted {
        command: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{command}: {stderr}")]
    Failed {
        command: &'static str,
        stderr: String,
    },
}

/// Run `cmd` to completion, bounded by `deadline`.
///
/// Returns the raw [`Output`] whatever the exit status; callers that only
/// care about success use [`run_checked`].
pub async fn run_bounded(
    mut cmd: Command,
    deadline: Duration,
    command: &'static str,
) -> Result<Output, ExecError> {
    match tokio::time::timeout(deadline, cmd.output()).await {
        Err(_expired) => Err(ExecError::DeadlineExpired { command, deadline }),
        Ok(Err(source)) => Err(ExecError::NotStarted { command, source }),
        Ok(Ok(output)) => Ok(output),
    }
}

/// Run `cmd` and return trimmed stdout.
///
/// A non-zero exit becomes [`ExecError::Failed`] carrying the trimmed
/// stderr, which is what the host CLIs put their diagnostics on.
pub async fn run_checked(
    cmd: Command,
    deadline: Duration,
    command: &'static str,
) -> Result<String, ExecError> {
    let output = run_bounded(cmd, deadline, command).await?;
    if !output.status.success() {
        return Err(ExecError::Failed {
            command,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
