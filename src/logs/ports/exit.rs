//! Source of a task's terminal signal.

use crate::runner::domain::TaskExit;
use crate::task::domain::TaskId;
use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Waits for a task to reach a terminal state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskExitSource: Send + Sync {
    /// Resolves once the task is terminal, or fails once `cancel` fires.
    async fn wait_exit(
        &self,
        task_id: TaskId,
        cancel: CancellationToken,
    ) -> Result<TaskExit, ExitWaitError>;
}

/// Errors returned while waiting for a task exit.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExitWaitError {
    /// The wait was cancelled before the task ended.
    #[error("wait for task {0} cancelled")]
    Cancelled(TaskId),
    /// The task does not exist.
    #[error("task not found: {0}")]
    NotFound(TaskId),
    /// Task state could not be read.
    #[error("failed to read task state: {0}")]
    Unavailable(String),
}
