// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests.

use crate::registry::{SessionRegistry, WorkerRegistry};
use crate::worker::{CompletionStrategy, WorkerLimits, WorkerSeed};
use plural_adapters::{FakeHost, FakeRunner, FakeRunnerFactory};
use plural_core::{FakeClock, Session, SessionState, WorkflowPolicy};
use std::sync::Arc;
use std::time::Duration;

pub(crate) struct TestBed {
    pub sessions: Arc<SessionRegistry>,
    pub workers: Arc<WorkerRegistry>,
    pub host: FakeHost,
    pub factory: FakeRunnerFactory,
    pub clock: FakeClock,
}

impl TestBed {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(SessionRegistry::new()),
            workers: Arc::new(WorkerRegistry::new()),
            host: FakeHost::new(),
            factory: FakeRunnerFactory::new(),
            clock: FakeClock::new(),
        }
    }

    /// Register a session whose id equals its branch name.
    pub fn session(&self, branch: &str) -> Arc<SessionState> {
        let state = SessionState::new(Session::builder().id(branch).branch(branch).build());
        self.sessions.register(Arc::clone(&state));
        state
    }

    pub fn seed(
        &self,
        session: Arc<SessionState>,
        runner: FakeRunner,
        prompt: &str,
        strategy: CompletionStrategy,
    ) -> WorkerSeed<FakeHost, FakeRunnerFactory, FakeClock> {
        WorkerSeed {
            session,
            sessions: Arc::clone(&self.sessions),
            workers: Arc::clone(&self.workers),
            host: self.host.clone(),
            factory: self.factory.clone(),
            runner,
            initial_prompt: prompt.to_string(),
            pr_link_text: String::new(),
            limits: WorkerLimits {
                max_turns: 10,
                max_duration: Duration::from_secs(300),
            },
            strategy,
            policy: WorkflowPolicy::default(),
            clock: self.clock.clone(),
        }
    }
}

/// Poll until `condition` holds, failing the test after ~2.5s.
pub(crate) async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within deadline");
}
