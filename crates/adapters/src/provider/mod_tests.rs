// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn default_branch_name_slugs_and_falls_back() {
    // Any provider gets the default naming; Asana has no override
    let provider = AsanaProvider::new("p1");

    let titled = IssueRef::new(IssueSource::Asana, "9", "Add rate limiting", "u");
    assert_eq!(provider.branch_name(&titled), "plural/add-rate-limiting");

    let untitled = IssueRef::new(IssueSource::Asana, "9", "——", "u");
    assert_eq!(provider.branch_name(&untitled), "plural/issue-9");
}

#[test]
fn default_pr_link_text_is_empty() {
    let provider = LinearProvider::new("team");
    let issue = IssueRef::new(IssueSource::Linear, "ENG-1", "t", "u");
    assert_eq!(provider.pr_link_text(&issue), "");
}
