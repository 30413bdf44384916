// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn defaults_match_documented_values() {
    let policy = WorkflowPolicy::default();
    assert_eq!(policy.max_concurrent, 3);
    assert_eq!(policy.merge_max_attempts, 120);
    assert_eq!(policy.merge_poll_interval, Duration::from_secs(60));
    assert!(!policy.auto_merge);
    assert!(policy.auto_address_comments);
    assert!(policy.review_poll_interval > policy.poll_interval);
}

#[parameterized(
    rebase = { "rebase", MergeMethod::Rebase },
    squash = { "squash", MergeMethod::Squash },
    merge = { "merge", MergeMethod::Merge },
)]
fn merge_method_parses(input: &str, expected: MergeMethod) {
    let parsed: MergeMethod = input.parse().unwrap();
    assert_eq!(parsed, expected);
    assert_eq!(parsed.as_str(), input);
}

#[test]
fn merge_method_rejects_unknown() {
    assert!("fast-forward".parse::<MergeMethod>().is_err());
}

#[test]
fn later_layers_win() {
    let global = PolicyOverrides {
        max_concurrent: Some(5),
        max_turns: Some(10),
        ..Default::default()
    };
    let repo = PolicyOverrides {
        max_turns: Some(20),
        merge_method: Some(MergeMethod::Rebase),
        ..Default::default()
    };
    let cli = PolicyOverrides {
        max_concurrent: Some(1),
        ..Default::default()
    };

    let policy = resolve(&[&global, &repo, &cli]);

    assert_eq!(policy.max_concurrent, 1); // CLI beats global
    assert_eq!(policy.max_turns, 20); // repo beats global
    assert_eq!(policy.merge_method, MergeMethod::Rebase);
    // Untouched knobs fall back to defaults
    assert_eq!(policy.max_feedback_rounds, 5);
}

#[test]
fn empty_layers_yield_defaults() {
    assert_eq!(resolve(&[]), WorkflowPolicy::default());
}

#[test]
fn duration_overrides_convert_units() {
    let cli = PolicyOverrides {
        max_duration_min: Some(90),
        poll_interval_secs: Some(15),
        ..Default::default()
    };
    let policy = resolve(&[&cli]);
    assert_eq!(policy.max_duration, Duration::from_secs(90 * 60));
    assert_eq!(policy.poll_interval, Duration::from_secs(15));
}

#[test]
fn workflow_config_parses_toml() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("plural.toml"),
        r#"
[workflow]
max_turns = 25
merge_method = "rebase"
on_ci_failure = "retry"
auto_merge = true
"#,
    )
    .unwrap();

    let config = WorkflowConfig::load_from_dir(dir.path()).unwrap().unwrap();
    assert_eq!(config.workflow.max_turns, Some(25));
    assert_eq!(config.workflow.merge_method, Some(MergeMethod::Rebase));
    assert_eq!(config.workflow.on_ci_failure, Some(CiFailurePolicy::Retry));
    assert_eq!(config.workflow.auto_merge, Some(true));
}

#[test]
fn workflow_config_missing_file_is_none() {
    let dir = tempfile::tempdir().unwrap();
    assert!(WorkflowConfig::load_from_dir(dir.path()).unwrap().is_none());
}

#[test]
fn workflow_config_bad_toml_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("plural.toml"), "[workflow\nbroken").unwrap();
    assert!(WorkflowConfig::load_from_dir(dir.path()).is_err());
}
