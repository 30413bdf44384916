// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Issue references from external trackers.
//!
//! An [`IssueRef`] identifies the external issue a work item was created
//! from. It is immutable after intake; the `(source, id)` pair is the
//! deduplication key across polls.

use crate::work_item::WorkItemId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Issue tracker a work item originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSource {
    Github,
    Asana,
    Linear,
}

impl IssueSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueSource::Github => "github",
            IssueSource::Asana => "asana",
            IssueSource::Linear => "linear",
        }
    }
}

impl fmt::Display for IssueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for IssueSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(IssueSource::Github),
            "asana" => Ok(IssueSource::Asana),
            "linear" => Ok(IssueSource::Linear),
            other => Err(format!("unknown issue source: {other}")),
        }
    }
}

/// Reference to an issue in an external tracker. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRef {
    pub source: IssueSource,
    /// Identifier in the external tracker (issue number, task gid, …)
    pub id: String,
    pub title: String,
    pub url: String,
}

impl IssueRef {
    pub fn new(
        source: IssueSource,
        id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            source,
            id: id.into(),
            title: title.into(),
            url: url.into(),
        }
    }

    /// Deduplication key: one non-terminal work item may exist per key.
    pub fn key(&self) -> IssueKey {
        IssueKey {
            source: self.source,
            id: self.id.clone(),
        }
    }

    /// Derive the work item id for this issue in the given repository.
    pub fn work_item_id(&self, repo_path: &Path) -> WorkItemId {
        WorkItemId::new(format!("{}-{}", repo_path.display(), self.id))
    }
}

/// `(source, external id)` pair used for intake deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueKey {
    pub source: IssueSource,
    pub id: String,
}

impl fmt::Display for IssueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.id)
    }
}

/// Slugify an issue title for use in branch names.
///
/// Lowercases, maps runs of non-alphanumeric characters to single hyphens,
/// and truncates to `max_len` without cutting mid-hyphen. Returns an empty
/// string for titles with no usable characters (callers fall back to
/// `issue-<id>`).
pub fn slugify(title: &str, max_len: usize) -> String {
    let mapped: String = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();

    let collapsed = mapped
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    if collapsed.len() <= max_len {
        collapsed
    } else {
        collapsed[..max_len].trim_end_matches('-').to_string()
    }
}

#[cfg(test)]
#[path = "issue_tests.rs"]
mod tests;
