// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Linear issue connector over the GraphQL API.
//!
//! Intake filter is a team: unstarted issues in the configured team are
//! candidate work items. Authentication is an API key in `LINEAR_API_KEY`.

use super::{IssueProvider, ProviderError};
use async_trait::async_trait;
use plural_core::{IssueRef, IssueSource};
use std::path::Path;

const LINEAR_API: &str = "https://api.linear.app/graphql";

/// Env var holding the Linear API key.
pub const TOKEN_ENV: &str = "LINEAR_API_KEY";

/// Linear connector; fetches unstarted issues in one team.
#[derive(Clone)]
pub struct LinearProvider {
    team_id: String,
    client: reqwest::Client,
}

impl LinearProvider {
    pub fn new(team_id: impl Into<String>) -> Self {
        Self {
            team_id: team_id.into(),
            client: reqwest::Client::new(),
        }
    }

    fn token() -> Result<String, ProviderError> {
        std::env::var(TOKEN_ENV).map_err(|_| ProviderError::MissingToken(TOKEN_ENV))
    }
}

#[async_trait]
impl IssueProvider for LinearProvider {
    fn source(&self) -> IssueSource {
        IssueSource::Linear
    }

    async fn is_configured(&self, _repo: &Path) -> bool {
        !self.team_id.is_empty() && Self::token().is_ok()
    }

    async fn fetch(&self, _repo: &Path) -> Result<Vec<IssueRef>, ProviderError> {
        let token = Self::token()?;
        let query = serde_json::json!({
            "query": "query($teamId: ID!) { issues(filter: { team: { id: { eq: $teamId } }, state: { type: { eq: \"unstarted\" } } }) { nodes { identifier title url } } }",
            "variables": { "teamId": self.team_id },
        });

        let response = self
            .client
            .post(LINEAR_API)
            .header("Authorization", token)
            .json(&query)
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Http(format!(
                "linear returned {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        parse_issue_nodes(&body)
    }
}

fn parse_issue_nodes(body: &serde_json::Value) -> Result<Vec<IssueRef>, ProviderError> {
    let Some(nodes) = body
        .pointer("/data/issues/nodes")
        .and_then(|v| v.as_array())
    else {
        return Err(ProviderError::Parse(
            "expected data.issues.nodes in linear response".to_string(),
        ));
    };

    let mut issues = Vec::new();
    for node in nodes {
        let Some(identifier) = node.get("identifier").and_then(|v| v.as_str()) else {
            continue;
        };
        issues.push(IssueRef::new(
            IssueSource::Linear,
            identifier,
            node.get("title").and_then(|v| v.as_str()).unwrap_or_default(),
            node.get("url").and_then(|v| v.as_str()).unwrap_or_default(),
        ));
    }
    Ok(issues)
}

#[cfg(test)]
#[path = "linear_tests.rs"]
mod tests;
