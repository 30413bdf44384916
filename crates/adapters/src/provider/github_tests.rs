// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parses_issue_list_json() {
    let json = r#"[
        {"number":42,"title":"Fix the flaky login test","url":"https://github.com/o/r/issues/42"},
        {"number":43,"title":"","url":"https://github.com/o/r/issues/43"}
    ]"#;

    let issues = parse_issue_list(json).unwrap();
    assert_eq!(issues.len(), 2);
    assert_eq!(issues[0].id, "42");
    assert_eq!(issues[0].source, IssueSource::Github);
    assert_eq!(issues[0].title, "Fix the flaky login test");
}

#[test]
fn parse_rejects_non_array() {
    assert!(parse_issue_list(r#"{"number":1}"#).is_err());
}

#[test]
fn pr_link_text_uses_autoclose_keyword() {
    let provider = GithubProvider::default();
    let issue = IssueRef::new(IssueSource::Github, "42", "t", "u");
    assert_eq!(provider.pr_link_text(&issue), "Fixes #42");
}

#[test]
fn branch_name_prefixes_slug() {
    let provider = GithubProvider::default();
    let issue = IssueRef::new(IssueSource::Github, "42", "Fix the flaky login test", "u");
    assert_eq!(provider.branch_name(&issue), "plural/fix-the-flaky-login-test");
}

#[test]
fn branch_name_falls_back_to_issue_id() {
    let provider = GithubProvider::default();
    let issue = IssueRef::new(IssueSource::Github, "42", "!!!", "u");
    assert_eq!(provider.branch_name(&issue), "plural/issue-42");
}
