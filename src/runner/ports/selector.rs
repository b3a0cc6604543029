//! Pool selection for tasks that name no runner.

use crate::task::domain::{RunnerId, Task};
use async_trait::async_trait;

/// Chooses a runner for a task without an explicit one.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RunnerSelector: Send + Sync {
    /// Returns the runner to use, or `None` when no runner is available.
    async fn select(&self, task: &Task) -> Option<RunnerId>;
}
