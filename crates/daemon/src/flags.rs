// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hand-rolled daemon flag parsing.
//!
//! Recognised options mirror the daemon configuration surface: `--once`,
//! `--repo`, the worker/slot caps, the policy toggles, the merge method and
//! the poll cadences. Everything maps onto [`PolicyOverrides`], which the
//! lifecycle layers over config-file defaults (CLI wins).

use plural_core::PolicyOverrides;
use std::path::PathBuf;
use thiserror::Error;

pub const USAGE: &str = "\
Usage: plurald [OPTIONS]

Options:
    --once                         Run one tick, wait for workers, exit
    --repo <FILTER>                Scope: a repository path or owner/name
    --state-dir <PATH>             Override the state directory
    --max-concurrent <N>           Concurrent assistant session cap
    --max-turns <N>                Assistant turns per worker run
    --max-duration-min <N>         Wall-clock minutes per worker run
    --max-feedback-rounds <N>      Feedback cycles per work item
    --merge-method <METHOD>        One of: rebase, squash, merge
    --on-ci-failure <POLICY>       One of: retry, notify, abandon
    --auto-merge / --no-auto-merge
    --auto-address-pr-comments / --no-auto-address-pr-comments
    --auto-broadcast-pr / --no-auto-broadcast-pr
    --poll-interval <SECS>         Scheduler tick cadence
    --review-poll-interval <SECS>  Review polling cadence
    -h, --help                     Print help
    -V, --version                  Print version
";

/// Errors from flag parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlagError {
    #[error("unknown flag: {0}")]
    Unknown(String),
    #[error("flag {0} requires a value")]
    MissingValue(String),
    #[error("invalid value for {flag}: {value}")]
    InvalidValue { flag: String, value: String },
}

/// Parsed daemon invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    Run(DaemonOptions),
    Help,
    Version,
}

/// Daemon options from the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DaemonOptions {
    pub once: bool,
    pub repo_filter: Option<String>,
    pub state_dir: Option<PathBuf>,
    pub overrides: PolicyOverrides,
}

/// Parse daemon arguments (without the program name).
pub fn parse(args: &[String]) -> Result<Invocation, FlagError> {
    let mut options = DaemonOptions::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        let mut value_for = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| FlagError::MissingValue(flag.to_string()))
        };

        match arg.as_str() {
            "-h" | "--help" => return Ok(Invocation::Help),
            "-V" | "--version" => return Ok(Invocation::Version),
            "--once" => options.once = true,
            "--repo" => options.repo_filter = Some(value_for("--repo")?),
            "--state-dir" => {
                options.state_dir = Some(PathBuf::from(value_for("--state-dir")?));
            }
            "--max-concurrent" => {
                options.overrides.max_concurrent =
                    Some(parse_number(arg, &value_for("--max-concurrent")?)?);
            }
            "--max-turns" => {
                options.overrides.max_turns = Some(parse_number(arg, &value_for("--max-turns")?)?);
            }
            "--max-duration-min" => {
                options.overrides.max_duration_min =
                    Some(parse_number(arg, &value_for("--max-duration-min")?)?);
            }
            "--max-feedback-rounds" => {
                options.overrides.max_feedback_rounds =
                    Some(parse_number(arg, &value_for("--max-feedback-rounds")?)?);
            }
            "--merge-method" => {
                let value = value_for("--merge-method")?;
                options.overrides.merge_method =
                    Some(value.parse().map_err(|_| FlagError::InvalidValue {
                        flag: arg.clone(),
                        value,
                    })?);
            }
            "--on-ci-failure" => {
                let value = value_for("--on-ci-failure")?;
                options.overrides.on_ci_failure =
                    Some(value.parse().map_err(|_| FlagError::InvalidValue {
                        flag: arg.clone(),
                        value,
                    })?);
            }
            "--auto-merge" => options.overrides.auto_merge = Some(true),
            "--no-auto-merge" => options.overrides.auto_merge = Some(false),
            "--auto-address-pr-comments" => {
                options.overrides.auto_address_comments = Some(true);
            }
            "--no-auto-address-pr-comments" => {
                options.overrides.auto_address_comments = Some(false);
            }
            "--auto-broadcast-pr" => options.overrides.auto_broadcast_pr = Some(true),
            "--no-auto-broadcast-pr" => options.overrides.auto_broadcast_pr = Some(false),
            "--poll-interval" => {
                options.overrides.poll_interval_secs =
                    Some(parse_number(arg, &value_for("--poll-interval")?)?);
            }
            "--review-poll-interval" => {
                options.overrides.review_poll_interval_secs =
                    Some(parse_number(arg, &value_for("--review-poll-interval")?)?);
            }
            other => return Err(FlagError::Unknown(other.to_string())),
        }
    }

    Ok(Invocation::Run(options))
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, FlagError> {
    value.parse().map_err(|_| FlagError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
#[path = "flags_tests.rs"]
mod tests;
