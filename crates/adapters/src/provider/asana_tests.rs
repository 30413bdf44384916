// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parses_task_list_skipping_completed() {
    let body = serde_json::json!({
        "data": [
            {"gid":"120001","name":"Wire up retry logic","permalink_url":"https://app.asana.com/t/120001","completed":false},
            {"gid":"120002","name":"Done already","permalink_url":"https://app.asana.com/t/120002","completed":true}
        ]
    });

    let issues = parse_task_list(&body).unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].id, "120001");
    assert_eq!(issues[0].source, IssueSource::Asana);
    assert_eq!(issues[0].title, "Wire up retry logic");
}

#[test]
fn parse_rejects_missing_data() {
    let body = serde_json::json!({"errors": []});
    assert!(parse_task_list(&body).is_err());
}

#[test]
fn no_pr_link_text_for_asana() {
    let provider = AsanaProvider::new("8899");
    let issue = IssueRef::new(IssueSource::Asana, "120001", "t", "u");
    assert_eq!(provider.pr_link_text(&issue), "");
}
