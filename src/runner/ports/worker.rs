//! Remote execution worker contract.

use crate::runner::domain::{StepExit, StepRequest};
use crate::task::domain::{TaskId, TemplateId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Worker that materializes workspaces and runs step scripts.
///
/// Output of every step is appended to the task's log artifact. A worker
/// flushes buffered output before reporting any step exit, including after
/// an abort.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Worker: Send + Sync {
    /// Starts one step. Returns once the worker accepted it.
    async fn start_step(&self, request: &StepRequest) -> WorkerResult<()>;

    /// Blocks until the step at `index` of `task_id` exits.
    async fn wait_step(&self, task_id: TaskId, index: usize) -> WorkerResult<StepExit>;

    /// Requests cooperative termination of the task's running step.
    async fn abort(&self, task_id: TaskId) -> WorkerResult<()>;

    /// Returns the report written by the task's scan step, if any.
    async fn scan_output(
        &self,
        template_id: TemplateId,
        task_id: TaskId,
    ) -> WorkerResult<Option<String>>;
}

/// Errors returned by worker implementations.
#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    /// The worker could not be reached.
    #[error("worker unreachable: {0}")]
    Unreachable(Arc<dyn std::error::Error + Send + Sync>),
    /// The worker refused the request.
    #[error("worker rejected request ({status}): {message}")]
    Rejected {
        /// HTTP-like status code.
        status: u16,
        /// Worker message.
        message: String,
    },
    /// The worker answered with an unexpected payload.
    #[error("invalid worker response: {0}")]
    InvalidResponse(String),
}

impl WorkerError {
    /// Wraps a connection failure.
    pub fn unreachable(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Unreachable(Arc::new(err))
    }
}
