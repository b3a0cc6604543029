//! Errors surfaced by control plane operations.

use crate::error::ErrorKind;
use crate::logs::adapters::LogError;
use crate::runner::services::DispatchError;
use crate::scan::services::ScanReconcileError;
use crate::task::{domain::TaskId, services::TaskLifecycleError};
use thiserror::Error;

/// Errors returned by [`super::ControlPlane`].
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Task creation, approval or lookup failed.
    #[error(transparent)]
    Lifecycle(#[from] TaskLifecycleError),
    /// The task could not be handed to a worker.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// Policy results could not be seeded or read.
    #[error(transparent)]
    Scan(#[from] ScanReconcileError),
    /// The log artifact could not be read.
    #[error(transparent)]
    Logs(#[from] LogError),
    /// The task does not exist.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
}

impl OrchestratorError {
    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Lifecycle(err) => err.kind(),
            Self::Dispatch(err) => err.kind(),
            Self::Scan(err) => err.kind(),
            Self::Logs(_) => ErrorKind::Transport,
            Self::TaskNotFound(_) => ErrorKind::NotFound,
        }
    }
}

/// Result type for control plane operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
