// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! GitHub issue connector over the `gh` CLI.
//!
//! Intake filter is a label. On pickup the intake label is swapped for a
//! work-in-progress label and a comment is posted; both are best-effort
//! side effects driven by the scheduler.

use super::{IssueProvider, ProviderError};
use crate::subprocess::{run_bounded, run_checked, STATE_QUERY_TIMEOUT};
use async_trait::async_trait;
use plural_core::{IssueRef, IssueSource};
use std::path::Path;
use tokio::process::Command;

/// Default intake label.
pub const DEFAULT_LABEL: &str = "plural";

/// Label applied once an issue has been picked up.
pub const WIP_LABEL: &str = "plural-wip";

/// GitHub connector; fetches open issues carrying the intake label.
#[derive(Clone)]
pub struct GithubProvider {
    label: String,
}

impl Default for GithubProvider {
    fn default() -> Self {
        Self::new(DEFAULT_LABEL)
    }
}

impl GithubProvider {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    fn gh(repo: &Path) -> Command {
        let mut cmd = Command::new("gh");
        cmd.current_dir(repo);
        cmd
    }
}

#[async_trait]
impl IssueProvider for GithubProvider {
    fn source(&self) -> IssueSource {
        IssueSource::Github
    }

    async fn is_configured(&self, repo: &Path) -> bool {
        let mut cmd = Command::new("git");
        cmd.current_dir(repo);
        cmd.args(["remote", "get-url", "origin"]);
        match run_bounded(cmd, STATE_QUERY_TIMEOUT, "git remote get-url").await {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).contains("github.com")
            }
            _ => false,
        }
    }

    async fn fetch(&self, repo: &Path) -> Result<Vec<IssueRef>, ProviderError> {
        let mut cmd = Self::gh(repo);
        cmd.args([
            "issue",
            "list",
            "--state",
            "open",
            "--label",
            &self.label,
            "--json",
            "number,title,url",
        ]);
        let json = run_checked(cmd, STATE_QUERY_TIMEOUT, "gh issue list")
            .await
            .map_err(|e| ProviderError::CommandFailed(e.to_string()))?;
        parse_issue_list(&json)
    }

    fn pr_link_text(&self, issue: &IssueRef) -> String {
        format!("Fixes #{}", issue.id)
    }

    async fn mark_in_progress(
        &self,
        repo: &Path,
        issue: &IssueRef,
    ) -> Result<(), ProviderError> {
        let mut edit = Self::gh(repo);
        edit.args([
            "issue",
            "edit",
            &issue.id,
            "--remove-label",
            &self.label,
            "--add-label",
            WIP_LABEL,
        ]);
        run_checked(edit, STATE_QUERY_TIMEOUT, "gh issue edit")
            .await
            .map_err(|e| ProviderError::CommandFailed(e.to_string()))?;

        let mut comment = Self::gh(repo);
        comment.args([
            "issue",
            "comment",
            &issue.id,
            "--body",
            "plural picked this issue up and is working on a pull request.",
        ]);
        run_checked(comment, STATE_QUERY_TIMEOUT, "gh issue comment")
            .await
            .map_err(|e| ProviderError::CommandFailed(e.to_string()))?;
        Ok(())
    }

    async fn mark_done(&self, repo: &Path, issue: &IssueRef) -> Result<(), ProviderError> {
        let mut edit = Self::gh(repo);
        edit.args(["issue", "edit", &issue.id, "--remove-label", WIP_LABEL]);
        run_checked(edit, STATE_QUERY_TIMEOUT, "gh issue edit")
            .await
            .map_err(|e| ProviderError::CommandFailed(e.to_string()))?;
        Ok(())
    }

    async fn announce_pr(
        &self,
        repo: &Path,
        issue: &IssueRef,
        pr_url: &str,
    ) -> Result<(), ProviderError> {
        let mut comment = Self::gh(repo);
        comment.args([
            "issue",
            "comment",
            &issue.id,
            "--body",
            &format!("Opened {pr_url} for this issue."),
        ]);
        run_checked(comment, STATE_QUERY_TIMEOUT, "gh issue comment")
            .await
            .map_err(|e| ProviderError::CommandFailed(e.to_string()))?;
        Ok(())
    }
}

fn parse_issue_list(json: &str) -> Result<Vec<IssueRef>, ProviderError> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| ProviderError::Parse(e.to_string()))?;
    let Some(entries) = value.as_array() else {
        return Err(ProviderError::Parse("expected a JSON array".to_string()));
    };

    let mut issues = Vec::new();
    for entry in entries {
        let Some(number) = entry.get("number").and_then(|v| v.as_u64()) else {
            continue;
        };
        issues.push(IssueRef::new(
            IssueSource::Github,
            number.to_string(),
            entry
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or_default(),
            entry.get("url").and_then(|v| v.as_str()).unwrap_or_default(),
        ));
    }
    Ok(issues)
}

#[cfg(test)]
#[path = "github_tests.rs"]
mod tests;
