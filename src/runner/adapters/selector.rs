//! Runner selection returning one configured default.

use crate::runner::ports::RunnerSelector;
use crate::task::domain::{RunnerId, Task};
use async_trait::async_trait;

/// Selector that always answers with the configured default runner.
#[derive(Debug, Clone, Default)]
pub struct StaticRunnerSelector {
    default: Option<RunnerId>,
}

impl StaticRunnerSelector {
    /// Creates a selector; `None` means no runner is ever available.
    #[must_use]
    pub const fn new(default: Option<RunnerId>) -> Self {
        Self { default }
    }
}

#[async_trait]
impl RunnerSelector for StaticRunnerSelector {
    async fn select(&self, _task: &Task) -> Option<RunnerId> {
        self.default.clone()
    }
}
