//! Step and task outcomes reported by workers and the dispatcher.

use crate::task::domain::{StepStatus, Task, TaskId, TaskStatus};
use serde::{Deserialize, Serialize};

/// Terminal status a worker reports for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepExitStatus {
    /// The step script exited zero.
    Complete,
    /// The step script exited non-zero or could not run.
    Failed,
    /// The step was aborted.
    Cancelled,
}

impl StepExitStatus {
    /// Returns the step status recorded on the task.
    #[must_use]
    pub const fn step_status(self) -> StepStatus {
        match self {
            Self::Complete => StepStatus::Complete,
            Self::Failed => StepStatus::Failed,
            Self::Cancelled => StepStatus::Cancelled,
        }
    }
}

/// Worker report for a finished step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepExit {
    /// Terminal status.
    pub status: StepExitStatus,
    /// Script exit code, when the script ran.
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// Failure detail.
    #[serde(default)]
    pub message: Option<String>,
}

impl StepExit {
    /// Successful exit with code zero.
    #[must_use]
    pub const fn complete() -> Self {
        Self {
            status: StepExitStatus::Complete,
            exit_code: Some(0),
            message: None,
        }
    }

    /// Failed exit with a message.
    #[must_use]
    pub fn failed(exit_code: Option<i32>, message: impl Into<String>) -> Self {
        Self {
            status: StepExitStatus::Failed,
            exit_code,
            message: Some(message.into()),
        }
    }

    /// Aborted exit.
    #[must_use]
    pub const fn cancelled() -> Self {
        Self {
            status: StepExitStatus::Cancelled,
            exit_code: None,
            message: None,
        }
    }
}

/// Terminal outcome of a whole task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    /// Every step completed.
    Success,
    /// A step failed.
    Failed,
    /// A step exceeded the step timeout.
    Timeout,
    /// The task was cancelled.
    Cancelled,
}

impl TaskOutcome {
    /// Maps a terminal task status to its outcome.
    #[must_use]
    pub const fn from_status(status: TaskStatus) -> Option<Self> {
        match status {
            TaskStatus::Complete => Some(Self::Success),
            TaskStatus::Failed => Some(Self::Failed),
            TaskStatus::Timeout => Some(Self::Timeout),
            TaskStatus::Cancelled => Some(Self::Cancelled),
            TaskStatus::Pending | TaskStatus::Running | TaskStatus::Approving => None,
        }
    }

    /// Returns the label used in logs and API payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Terminal signal of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskExit {
    /// Task that ended.
    pub task_id: TaskId,
    /// How it ended.
    pub outcome: TaskOutcome,
    /// Message of the step that ended it, if any.
    pub message: Option<String>,
}

impl TaskExit {
    /// Builds the exit signal of a terminal task; `None` while it runs.
    #[must_use]
    pub fn from_task(task: &Task) -> Option<Self> {
        let outcome = TaskOutcome::from_status(task.status())?;
        let message = task
            .steps()
            .iter()
            .rev()
            .find_map(|step| step.message.clone());
        Some(Self {
            task_id: task.id(),
            outcome,
            message,
        })
    }
}
