// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Issue-source connectors.
//!
//! An [`IssueProvider`] bridges one external tracker into the scheduler:
//! it fetches flagged issues for a repository, names branches, and (for the
//! label-based provider) flips intake labels. Providers are polled by the
//! scheduler; transient fetch errors are logged and retried on the next
//! tick.

mod asana;
mod github;
mod linear;

pub use asana::AsanaProvider;
pub use github::GithubProvider;
pub use linear::LinearProvider;

use async_trait::async_trait;
use plural_core::issue::slugify;
use plural_core::{IssueRef, IssueSource};
use std::path::Path;
use thiserror::Error;

/// Branch prefix for all work-item branches.
pub const BRANCH_PREFIX: &str = "plural/";

/// Maximum slug length in generated branch names.
const BRANCH_SLUG_LEN: usize = 40;

/// Errors from issue-source operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("command failed: {0}")]
    CommandFailed(String),
    #[error("http request failed: {0}")]
    Http(String),
    #[error("unexpected provider response: {0}")]
    Parse(String),
    #[error("missing credential: {0} is not set")]
    MissingToken(&'static str),
}

/// One external issue tracker, as consumed by the scheduler.
#[async_trait]
pub trait IssueProvider: Send + Sync {
    fn source(&self) -> IssueSource;

    /// Whether this provider can serve the given repository.
    async fn is_configured(&self, repo: &Path) -> bool;

    /// Fetch open, flagged issues through the provider's intake filter
    /// (a label for GitHub, a project for Asana, a team for Linear).
    async fn fetch(&self, repo: &Path) -> Result<Vec<IssueRef>, ProviderError>;

    /// Branch name for an issue: prefix + slugified title, falling back to
    /// `issue-<id>` when the title has no usable characters.
    fn branch_name(&self, issue: &IssueRef) -> String {
        let slug = slugify(&issue.title, BRANCH_SLUG_LEN);
        if slug.is_empty() {
            format!("{BRANCH_PREFIX}issue-{}", issue.id)
        } else {
            format!("{BRANCH_PREFIX}{slug}")
        }
    }

    /// Text linking a PR back to its issue (e.g. `Fixes #N` for the host
    /// that auto-closes on merge). Empty for providers without a keyword.
    fn pr_link_text(&self, _issue: &IssueRef) -> String {
        String::new()
    }

    /// Flag the issue as picked up (label swap, intake comment). Best
    /// effort: the scheduler logs failures and never fails the work item.
    async fn mark_in_progress(
        &self,
        _repo: &Path,
        _issue: &IssueRef,
    ) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Clear the work-in-progress flag once the item completes. Best
    /// effort, like [`mark_in_progress`](Self::mark_in_progress).
    async fn mark_done(&self, _repo: &Path, _issue: &IssueRef) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Post the PR link back on the issue. Best effort; only used when
    /// `auto_broadcast_pr` is enabled.
    async fn announce_pr(
        &self,
        _repo: &Path,
        _issue: &IssueRef,
        _pr_url: &str,
    ) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
