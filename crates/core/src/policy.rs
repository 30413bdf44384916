// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow policies and their layered resolution.
//!
//! Every knob resolves CLI override > per-repo config > global config >
//! built-in default. Overrides are partial ([`PolicyOverrides`]); resolution
//! produces a fully populated [`WorkflowPolicy`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// How an approved, green PR is merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMethod {
    Rebase,
    Squash,
    Merge,
}

impl MergeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeMethod::Rebase => "rebase",
            MergeMethod::Squash => "squash",
            MergeMethod::Merge => "merge",
        }
    }
}

impl fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MergeMethod {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rebase" => Ok(MergeMethod::Rebase),
            "squash" => Ok(MergeMethod::Squash),
            "merge" => Ok(MergeMethod::Merge),
            other => Err(PolicyError::UnknownMergeMethod(other.to_string())),
        }
    }
}

/// What to do with a work item whose PR fails CI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiFailurePolicy {
    /// Send the item back to review; the next feedback round may fix CI
    Retry,
    /// Fail the item and surface the error
    Notify,
    /// Abandon the item
    Abandon,
}

impl std::str::FromStr for CiFailurePolicy {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "retry" => Ok(CiFailurePolicy::Retry),
            "notify" => Ok(CiFailurePolicy::Notify),
            "abandon" => Ok(CiFailurePolicy::Abandon),
            other => Err(PolicyError::UnknownCiPolicy(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("unknown merge method: {0} (expected rebase, squash or merge)")]
    UnknownMergeMethod(String),
    #[error("unknown CI failure policy: {0} (expected retry, notify or abandon)")]
    UnknownCiPolicy(String),
    #[error("failed to read workflow config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse workflow config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Fully resolved workflow policy.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowPolicy {
    /// Cap on concurrent assistant sessions (slots)
    pub max_concurrent: u32,
    /// Cap on assistant turns per worker run
    pub max_turns: u32,
    /// Cap on wall-clock time per worker run
    pub max_duration: Duration,
    /// Cap on feedback-address cycles per work item
    pub max_feedback_rounds: u32,
    pub merge_method: MergeMethod,
    pub on_ci_failure: CiFailurePolicy,
    pub auto_merge: bool,
    pub auto_address_comments: bool,
    /// Post the PR link back on the originating issue
    pub auto_broadcast_pr: bool,
    /// Scheduler tick cadence
    pub poll_interval: Duration,
    /// Review polling cadence; coarser than the tick
    pub review_poll_interval: Duration,
    /// Auto-merge machine iteration cap
    pub merge_max_attempts: u32,
    /// Auto-merge machine iteration sleep
    pub merge_poll_interval: Duration,
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            max_turns: 50,
            max_duration: Duration::from_secs(30 * 60),
            max_feedback_rounds: 5,
            merge_method: MergeMethod::Squash,
            on_ci_failure: CiFailurePolicy::Notify,
            auto_merge: false,
            auto_address_comments: true,
            auto_broadcast_pr: false,
            poll_interval: Duration::from_secs(60),
            review_poll_interval: Duration::from_secs(300),
            merge_max_attempts: 120,
            merge_poll_interval: Duration::from_secs(60),
        }
    }
}

/// Partial policy, as read from a config file layer or CLI flags.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PolicyOverrides {
    pub max_concurrent: Option<u32>,
    pub max_turns: Option<u32>,
    pub max_duration_min: Option<u64>,
    pub max_feedback_rounds: Option<u32>,
    pub merge_method: Option<MergeMethod>,
    pub on_ci_failure: Option<CiFailurePolicy>,
    pub auto_merge: Option<bool>,
    pub auto_address_comments: Option<bool>,
    pub auto_broadcast_pr: Option<bool>,
    pub poll_interval_secs: Option<u64>,
    pub review_poll_interval_secs: Option<u64>,
}

impl PolicyOverrides {
    /// Layer `self` over `base`: set fields win.
    fn apply(&self, base: &mut WorkflowPolicy) {
        if let Some(v) = self.max_concurrent {
            base.max_concurrent = v;
        }
        if let Some(v) = self.max_turns {
            base.max_turns = v;
        }
        if let Some(v) = self.max_duration_min {
            base.max_duration = Duration::from_secs(v * 60);
        }
        if let Some(v) = self.max_feedback_rounds {
            base.max_feedback_rounds = v;
        }
        if let Some(v) = self.merge_method {
            base.merge_method = v;
        }
        if let Some(v) = self.on_ci_failure {
            base.on_ci_failure = v;
        }
        if let Some(v) = self.auto_merge {
            base.auto_merge = v;
        }
        if let Some(v) = self.auto_address_comments {
            base.auto_address_comments = v;
        }
        if let Some(v) = self.auto_broadcast_pr {
            base.auto_broadcast_pr = v;
        }
        if let Some(v) = self.poll_interval_secs {
            base.poll_interval = Duration::from_secs(v);
        }
        if let Some(v) = self.review_poll_interval_secs {
            base.review_poll_interval = Duration::from_secs(v);
        }
    }
}

/// Resolve a policy from layered overrides, weakest first.
///
/// `layers` are applied in order, so callers pass
/// `[global config, repo config, CLI flags]`.
pub fn resolve(layers: &[&PolicyOverrides]) -> WorkflowPolicy {
    let mut policy = WorkflowPolicy::default();
    for layer in layers {
        layer.apply(&mut policy);
    }
    policy
}

/// On-disk workflow config (`plural.toml`), global or per-repo.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub workflow: PolicyOverrides,
}

impl WorkflowConfig {
    /// Load `plural.toml` from a directory, if present.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>, PolicyError> {
        let path = dir.join("plural.toml");
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path).map_err(|e| PolicyError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config = toml::from_str(&text).map_err(|e| PolicyError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(Some(config))
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
