// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: configuration, startup, shutdown.

use crate::flags::DaemonOptions;
use plural_adapters::{
    AsanaProvider, CommandRunnerFactory, GhHostAdapter, GithubProvider, IssueProvider,
    LinearProvider,
};
use plural_core::{policy, PolicyOverrides, SystemClock, WorkflowPolicy};
use plural_engine::{recover, Scheduler, SchedulerConfig};
use plural_storage::{load_state, lock::lock_file_name, LockError, ScopeLock, WorkItemStore};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// The daemon's concrete scheduler type.
pub type DaemonScheduler = Scheduler<GhHostAdapter, CommandRunnerFactory, SystemClock>;

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine a state directory (set PLURAL_STATE_DIR)")]
    NoStateDir,

    #[error("no repository matches the scope filter {0}")]
    EmptyScope(String),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Policy(#[from] plural_core::policy::PolicyError),

    #[error(transparent)]
    Snapshot(#[from] plural_storage::SnapshotError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/plural)
    pub state_dir: PathBuf,
    /// Scope identifier this daemon serves
    pub scope: String,
    /// Repositories matched by the scope filter
    pub repos: Vec<PathBuf>,
    /// Path to the daemon log file
    pub log_path: PathBuf,
    /// Path to the per-scope state file
    pub state_path: PathBuf,
    /// Path to the worktrees directory
    pub worktrees_path: PathBuf,
    /// Fully resolved workflow policy
    pub policy: WorkflowPolicy,
    /// Run one tick, drain workers, exit
    pub once: bool,
}

impl Config {
    /// Resolve configuration from CLI options, config files and defaults.
    ///
    /// Policy layering, weakest first: global config (`plural.toml` in the
    /// state dir), per-repo config (`plural.toml` in the scoped repo), CLI
    /// flags.
    pub fn resolve(options: &DaemonOptions) -> Result<Self, LifecycleError> {
        let state_dir = options
            .state_dir
            .clone()
            .or_else(crate::env::state_dir)
            .ok_or(LifecycleError::NoStateDir)?;

        let scope = match &options.repo_filter {
            Some(filter) => filter.clone(),
            None => std::env::current_dir()?.display().to_string(),
        };
        let repos = resolve_repos(&scope)?;

        let global = policy::WorkflowConfig::load_from_dir(&state_dir)?
            .map(|config| config.workflow)
            .unwrap_or_default();
        let repo_layer = match repos.first() {
            Some(repo) => policy::WorkflowConfig::load_from_dir(repo)?
                .map(|config| config.workflow)
                .unwrap_or_default(),
            None => PolicyOverrides::default(),
        };
        let resolved = policy::resolve(&[&global, &repo_layer, &options.overrides]);

        let scope_hash = lock_file_name(&scope);
        let state_file = scope_hash.replace(".lock", ".json");

        Ok(Self {
            log_path: state_dir.join("daemon.log"),
            state_path: state_dir.join(state_file),
            worktrees_path: state_dir.join("worktrees"),
            state_dir,
            scope,
            repos,
            policy: resolved,
            once: options.once,
        })
    }
}

/// Resolve the repositories a scope filter names.
///
/// A filesystem path is taken as-is; an `owner/name` filter is matched by
/// the per-repo provider configuration probes at poll time, so it resolves
/// to the current directory here.
fn resolve_repos(scope: &str) -> Result<Vec<PathBuf>, LifecycleError> {
    let path = PathBuf::from(scope);
    if path.is_dir() {
        return Ok(vec![path]);
    }
    if scope.contains('/') && !scope.starts_with('/') {
        // owner/name form: serve the repository in the working directory
        let cwd = std::env::current_dir()?;
        return Ok(vec![cwd]);
    }
    Err(LifecycleError::EmptyScope(scope.to_string()))
}

/// A started daemon: the scheduler plus the held scope lock.
pub struct Daemon {
    pub scheduler: DaemonScheduler,
    pub config: Config,
    lock: ScopeLock,
}

impl Daemon {
    /// Shutdown: cancel workers, drain, persist, release the lock.
    pub async fn shutdown(mut self) {
        self.scheduler.shutdown().await;
        if let Err(e) = self.lock.release() {
            warn!(error = %e, "failed to release scope lock");
        }
        info!("daemon stopped");
    }
}

/// Start the daemon: lock the scope, load state, run recovery, build the
/// scheduler.
pub async fn startup(config: Config) -> Result<Daemon, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;
    let lock = ScopeLock::acquire(&config.state_dir, &config.scope)?;

    let store = match load_state(&config.state_path)? {
        Some(file) => {
            info!(
                items = file.work_items.len(),
                scope = %file.repo_path,
                "loaded persisted state"
            );
            Arc::new(WorkItemStore::from_items(file.work_items))
        }
        None => {
            info!("no persisted state; starting fresh");
            Arc::new(WorkItemStore::new())
        }
    };

    std::fs::create_dir_all(&config.worktrees_path)?;
    let host = GhHostAdapter::new(config.worktrees_path.clone());
    let clock = SystemClock;

    // Reconcile loaded items with the host before the first tick
    recover(&store, &host, &clock).await;

    let factory = CommandRunnerFactory::new(crate::env::assistant_command());
    let providers = build_providers();

    let scheduler = Scheduler::new(
        store,
        providers,
        host,
        factory,
        clock,
        config.policy.clone(),
        SchedulerConfig {
            scope: config.scope.clone(),
            repos: config.repos.clone(),
            state_path: config.state_path.clone(),
        },
    );

    info!(scope = %config.scope, repos = config.repos.len(), "daemon started");
    Ok(Daemon {
        scheduler,
        config,
        lock,
    })
}

/// Issue providers, in fixed order. GitHub is always present; Asana and
/// Linear join when their project/team is configured in the environment.
fn build_providers() -> Vec<Arc<dyn IssueProvider>> {
    let mut providers: Vec<Arc<dyn IssueProvider>> = vec![Arc::new(GithubProvider::default())];
    if let Ok(project) = std::env::var("PLURAL_ASANA_PROJECT") {
        providers.push(Arc::new(AsanaProvider::new(project)));
    }
    if let Ok(team) = std::env::var("PLURAL_LINEAR_TEAM") {
        providers.push(Arc::new(LinearProvider::new(team)));
    }
    providers
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
