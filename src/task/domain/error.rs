//! Error types for task domain validation and parsing.

use super::{StepName, StepStatus, TaskId, TaskStatus};
use thiserror::Error;

/// Errors returned while constructing or mutating task domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskDomainError {
    /// The runner identifier is empty, too long or contains whitespace.
    #[error("invalid runner identifier '{0}'")]
    InvalidRunnerId(String),

    /// The task type is missing.
    #[error("task type must be provided")]
    MissingTaskType,

    /// The template name is empty after trimming.
    #[error("template name must not be empty")]
    EmptyTemplateName,

    /// The step timeout is zero.
    #[error("step timeout must be greater than zero")]
    ZeroStepTimeout,

    /// Transitioning the task between two states is invalid.
    #[error("invalid state transition for task {task_id}: {from} -> {to}")]
    InvalidStateTransition {
        /// Task whose transition was rejected.
        task_id: TaskId,
        /// Current task state.
        from: TaskStatus,
        /// Requested task state.
        to: TaskStatus,
    },

    /// Transitioning a step between two states is invalid.
    #[error("invalid transition for step {step} of task {task_id}: {from} -> {to}")]
    InvalidStepTransition {
        /// Task owning the step.
        task_id: TaskId,
        /// Step whose transition was rejected.
        step: StepName,
        /// Current step state.
        from: StepStatus,
        /// Requested step state.
        to: StepStatus,
    },

    /// The step index does not exist in the task flow.
    #[error("task {task_id} has no step at index {index}")]
    StepNotFound {
        /// Task that was addressed.
        task_id: TaskId,
        /// Requested step index.
        index: usize,
    },

    /// A step was started before all of its predecessors completed.
    #[error("step {index} of task {task_id} started out of flow order")]
    StepOutOfOrder {
        /// Task that was addressed.
        task_id: TaskId,
        /// Requested step index.
        index: usize,
    },

    /// Approval was requested while no review step is awaiting approval.
    #[error("task {0} is not awaiting approval")]
    NotAwaitingApproval(TaskId),
}

/// Error returned while parsing a task type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unsupported task type: {0}")]
pub struct ParseTaskTypeError(pub String);

/// Error returned while parsing task or step states from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown status: {0}")]
pub struct ParseStatusError(pub String);
