// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! plural-adapters: external-world facades.
//!
//! Issue-provider connectors, the host/VCS adapter over the `gh` and `git`
//! CLIs, and the assistant-runner channel surface. Everything here is a
//! stateless facade behind a narrow trait so the engine can be driven by
//! fakes in tests.

pub mod gh;
pub mod host;
pub mod provider;
pub mod runner;
pub mod subprocess;

pub use gh::GhHostAdapter;
pub use host::{
    drain_stream, last_url_line, CiStatus, EventStream, HostAdapter, HostError, NewSession,
    PrSnapshot, PrState, ReviewComment, ReviewDecision, SessionBackend, StreamEvent,
};
pub use provider::{
    AsanaProvider, GithubProvider, IssueProvider, LinearProvider, ProviderError,
};
pub use runner::{
    AssistantRunner, ChildInfo, ChildSessionState, ChildStatus, CommandRunner,
    CommandRunnerFactory, CreateChildRequest, CreatePrRequest, ListChildrenRequest,
    MergeChildRequest, PermissionRequest, PermissionResponse, PlanApprovalRequest,
    PushBranchRequest, Question, QuestionRequest, ResponseChunk, ReviewCommentsRequest,
    RunnerChannels, RunnerError, RunnerFactory,
};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeHost, FakeProvider, FakeRunner, FakeRunnerFactory, HostCall, ProviderCall};
