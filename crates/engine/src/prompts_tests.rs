// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use plural_core::IssueSource;

fn issue() -> IssueRef {
    IssueRef::new(
        IssueSource::Github,
        "42",
        "Fix login flakiness",
        "https://github.com/o/r/issues/42",
    )
}

#[test]
fn initial_prompt_names_issue_and_link_text() {
    let prompt = initial_prompt(&issue(), "Fixes #42");
    assert!(prompt.contains("Fix login flakiness"));
    assert!(prompt.contains("https://github.com/o/r/issues/42"));
    assert!(prompt.contains("Fixes #42"));
}

#[test]
fn initial_prompt_omits_empty_link_text() {
    let prompt = initial_prompt(&issue(), "");
    assert!(!prompt.contains("Include the line"));
}

#[test]
fn feedback_prompt_contains_literal_count() {
    let comments = vec![
        ReviewComment {
            author: "ana".to_string(),
            body: "rename this".to_string(),
            path: Some("src/lib.rs".to_string()),
            line: Some(10),
        },
        ReviewComment {
            author: "raj".to_string(),
            body: "missing test".to_string(),
            path: None,
            line: None,
        },
    ];

    let prompt = feedback_prompt(3, &comments);
    assert!(prompt.contains("3 comment(s)"));
    assert!(prompt.contains("ana (src/lib.rs:10): rename this"));
    assert!(prompt.contains("raj: missing test"));
}

#[test]
fn supervisor_messages_count_children() {
    let progress = child_progress("plural/x-child-1", 2, 3);
    assert!(progress.contains("plural/x-child-1"));
    assert!(progress.contains("2 of 3"));

    let all = all_children_complete(3);
    assert!(all.contains("All 3 children are complete"));
}

#[test]
fn pr_title_falls_back_for_untitled_issues() {
    let mut untitled = issue();
    untitled.title = String::new();
    assert_eq!(pr_title(&untitled), "Automated change for issue 42");
    assert_eq!(pr_title(&issue()), "Fix login flakiness");
}

#[test]
fn pr_body_links_issue() {
    let body = pr_body(&issue(), "Fixes #42");
    assert!(body.contains("[Fix login flakiness](https://github.com/o/r/issues/42)"));
    assert!(body.ends_with("Fixes #42"));
}
