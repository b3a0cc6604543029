//! Shared world state for control plane BDD scenarios.

use crate::test_helpers::{CollectingSink, Harness, build_harness};
use caisson::logs::domain::FollowEnd;
use caisson::orchestrator::OrchestratorError;
use caisson::scan::domain::PolicyResult;
use caisson::task::domain::{Environment, TaskId};
use caisson::task::ports::TaskCreation;
use rstest::fixture;

/// Scenario world for control plane behaviour tests.
pub struct ControlPlaneWorld {
    pub harness: Harness,
    pub environment: Option<Environment>,
    pub existing_task: Option<TaskId>,
    pub last_request: Option<Result<TaskCreation, OrchestratorError>>,
    pub results: Vec<PolicyResult>,
    pub sessions: Vec<(FollowEnd, CollectingSink)>,
}

impl ControlPlaneWorld {
    /// Creates a world around a fresh control plane.
    #[must_use]
    pub fn new() -> Self {
        Self {
            harness: build_harness(),
            environment: None,
            existing_task: None,
            last_request: None,
            results: Vec::new(),
            sessions: Vec::new(),
        }
    }

    /// Returns the environment seeded by a given step.
    pub fn environment(&self) -> Result<&Environment, eyre::Report> {
        self.environment
            .as_ref()
            .ok_or_else(|| eyre::eyre!("missing environment in scenario world"))
    }
}

impl Default for ControlPlaneWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> ControlPlaneWorld {
    ControlPlaneWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
