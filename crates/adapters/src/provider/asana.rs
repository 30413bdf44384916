// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Asana task connector over the REST API.
//!
//! Intake filter is a project: every incomplete task in the configured
//! project is a candidate work item. Authentication is a personal access
//! token in `ASANA_TOKEN`.

use super::{IssueProvider, ProviderError};
use async_trait::async_trait;
use plural_core::{IssueRef, IssueSource};
use std::path::Path;

const ASANA_API: &str = "https://app.asana.com/api/1.0";

/// Env var holding the Asana personal access token.
pub const TOKEN_ENV: &str = "ASANA_TOKEN";

/// Asana connector; fetches incomplete tasks in one project.
#[derive(Clone)]
pub struct AsanaProvider {
    project_gid: String,
    client: reqwest::Client,
}

impl AsanaProvider {
    pub fn new(project_gid: impl Into<String>) -> Self {
        Self {
            project_gid: project_gid.into(),
            client: reqwest::Client::new(),
        }
    }

    fn token() -> Result<String, ProviderError> {
        std::env::var(TOKEN_ENV).map_err(|_| ProviderError::MissingToken(TOKEN_ENV))
    }
}

#[async_trait]
impl IssueProvider for AsanaProvider {
    fn source(&self) -> IssueSource {
        IssueSource::Asana
    }

    async fn is_configured(&self, _repo: &Path) -> bool {
        !self.project_gid.is_empty() && Self::token().is_ok()
    }

    async fn fetch(&self, _repo: &Path) -> Result<Vec<IssueRef>, ProviderError> {
        let token = Self::token()?;
        let url = format!(
            "{ASANA_API}/projects/{}/tasks?opt_fields=name,permalink_url,completed",
            self.project_gid
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Http(format!(
                "asana returned {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        parse_task_list(&body)
    }
}

fn parse_task_list(body: &serde_json::Value) -> Result<Vec<IssueRef>, ProviderError> {
    let Some(tasks) = body.get("data").and_then(|v| v.as_array()) else {
        return Err(ProviderError::Parse(
            "expected a data array in asana response".to_string(),
        ));
    };

    let mut issues = Vec::new();
    for task in tasks {
        if task
            .get("completed")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
        {
            continue;
        }
        let Some(gid) = task.get("gid").and_then(|v| v.as_str()) else {
            continue;
        };
        issues.push(IssueRef::new(
            IssueSource::Asana,
            gid,
            task.get("name").and_then(|v| v.as_str()).unwrap_or_default(),
            task.get("permalink_url")
                .and_then(|v| v.as_str())
                .unwrap_or_default(),
        ));
    }
    Ok(issues)
}

#[cfg(test)]
#[path = "asana_tests.rs"]
mod tests;
