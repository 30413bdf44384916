// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plural Daemon (plurald)
//!
//! Long-running process that watches issue trackers for flagged items and
//! drives each one from intake through coding, review, CI and merge.
//!
//! Architecture:
//! - Scheduler tick: serial loop advancing every work item
//! - Session workers: one spawned task per active assistant session

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use plural_daemon::flags::{self, Invocation};
use plural_daemon::lifecycle::{self, Config, Daemon, LifecycleError};
use plural_storage::LockError;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match flags::parse(&args) {
        Ok(Invocation::Help) => {
            println!("plurald {}", env!("CARGO_PKG_VERSION"));
            println!("Autonomous issue-to-merge orchestrator daemon");
            println!();
            print!("{}", flags::USAGE);
            return Ok(());
        }
        Ok(Invocation::Version) => {
            println!("plurald {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Ok(Invocation::Run(options)) => options,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!();
            eprint!("{}", flags::USAGE);
            std::process::exit(2);
        }
    };

    let config = Config::resolve(&options)?;

    // Rotate the log if it has grown too large, then set up logging
    rotate_log_if_needed(&config.log_path);
    write_startup_marker(&config.log_path)?;
    let _log_guard = setup_logging(&config)?;

    info!(scope = %config.scope, "starting daemon");

    let daemon = match lifecycle::startup(config).await {
        Ok(daemon) => daemon,
        Err(LifecycleError::Lock(LockError::Held { pid, .. })) => {
            eprintln!("plurald is already running for this scope");
            if !pid.is_empty() {
                eprintln!("  pid: {pid}");
            }
            std::process::exit(1);
        }
        Err(e) => {
            error!("failed to start daemon: {e}");
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    run(daemon).await
}

async fn run(mut daemon: Daemon) -> Result<(), Box<dyn std::error::Error>> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    if daemon.config.once {
        // One tick, then keep collecting until every worker has drained
        if let Err(e) = daemon.scheduler.tick().await {
            error!("tick failed: {e}");
        }
        while daemon.scheduler.has_workers() {
            tokio::time::sleep(Duration::from_millis(500)).await;
            if let Err(e) = daemon.scheduler.tick().await {
                error!("tick failed: {e}");
            }
        }
        daemon.shutdown().await;
        return Ok(());
    }

    // NOTE: the interval must be created outside the loop - tokio::select!
    // re-evaluates branches on each iteration, so a sleep() inside would
    // reset on every wakeup. The first tick fires immediately.
    let mut interval = tokio::time::interval(daemon.config.policy.poll_interval);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = daemon.scheduler.tick().await {
                    error!("tick failed: {e}");
                }
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }
            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }
        }
    }

    daemon.shutdown().await;
    Ok(())
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep (daemon.log.1, .2, .3).
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log file if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `daemon.log` → `daemon.log.1` → `daemon.log.2` → `daemon.log.3`,
/// deleting the oldest. Best-effort: rotation failures are silently ignored
/// so the daemon still starts.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(metadata) => metadata.len(),
        Err(_) => return,
    };

    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();

    // Shift older rotations: .3 is deleted, .2→.3, .1→.2
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    // Rotate current log → .1
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

/// Startup marker written before tracing is set up, so operators can find
/// where the current run begins when scanning the log.
fn write_startup_marker(log_path: &std::path::Path) -> std::io::Result<()> {
    use std::io::Write;

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;
    writeln!(file, "--- plurald: starting (pid: {}) ---\n", std::process::id())?;
    Ok(())
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_dir = config
        .log_path
        .parent()
        .ok_or_else(|| std::io::Error::other("log path has no parent directory"))?;
    std::fs::create_dir_all(log_dir)?;
    let file_name = config
        .log_path
        .file_name()
        .ok_or_else(|| std::io::Error::other("log path has no file name"))?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
