// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt and message formatting for assistant sessions.

use plural_adapters::ReviewComment;
use plural_core::IssueRef;
use std::fmt::Write;

/// Initial prompt seeding a coding session for an issue.
pub fn initial_prompt(issue: &IssueRef, pr_link_text: &str) -> String {
    let mut prompt = format!(
        "Work on the following issue from {}:\n\n\
         Title: {}\n\
         URL: {}\n\n\
         Implement the change in this working copy, keeping commits small \
         and focused. When the work is complete, create a pull request for \
         the current branch.",
        issue.source, issue.title, issue.url,
    );
    if !pr_link_text.is_empty() {
        let _ = write!(
            prompt,
            " Include the line \"{pr_link_text}\" in the pull request description."
        );
    }
    prompt
}

/// Prompt for a feedback round, summarising the new review comments.
///
/// Always contains the literal `N comment(s)` count so operators can grep
/// session logs for feedback rounds.
pub fn feedback_prompt(new_comments: u32, comments: &[ReviewComment]) -> String {
    let mut prompt = format!(
        "The pull request received {new_comments} comment(s) since the last \
         round. Address each one in this working copy:\n"
    );
    for comment in comments {
        let _ = write!(prompt, "\n- {}", comment.author);
        if let Some(path) = &comment.path {
            let _ = write!(prompt, " ({path}");
            if let Some(line) = comment.line {
                let _ = write!(prompt, ":{line}");
            }
            let _ = write!(prompt, ")");
        }
        let _ = write!(prompt, ": {}", comment.body);
    }
    prompt.push_str(
        "\n\nDo not push; the updated branch is pushed automatically when you finish.",
    );
    prompt
}

/// Initial prompt for a child session spawned by a supervisor.
pub fn child_task_prompt(task: &str) -> String {
    format!(
        "You are a child session working on one part of a larger change. \
         Your task:\n\n{task}\n\n\
         Work only on this task. Commit your changes on the current branch; \
         your supervisor reviews and merges them."
    )
}

/// Supervisor notification: one child finished, others still running.
pub fn child_progress(child_branch: &str, running: usize, total: usize) -> String {
    format!(
        "Child session on branch {child_branch} completed. \
         {running} of {total} children are still running."
    )
}

/// Supervisor notification: every child finished.
pub fn all_children_complete(total: usize) -> String {
    format!(
        "All {total} children are complete. Review their branches, merge the \
         work you want to keep, and finish the task."
    )
}

/// Pull request title for an issue.
pub fn pr_title(issue: &IssueRef) -> String {
    if issue.title.is_empty() {
        format!("Automated change for issue {}", issue.id)
    } else {
        issue.title.clone()
    }
}

/// Pull request body for an issue.
pub fn pr_body(issue: &IssueRef, pr_link_text: &str) -> String {
    let mut body = format!(
        "Automated change for [{}]({}).",
        if issue.title.is_empty() {
            &issue.id
        } else {
            &issue.title
        },
        issue.url,
    );
    if !pr_link_text.is_empty() {
        let _ = write!(body, "\n\n{pr_link_text}");
    }
    body
}

#[cfg(test)]
#[path = "prompts_tests.rs"]
mod tests;
