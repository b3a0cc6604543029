//! Task types and lifecycle states for tasks and steps.

use super::{ParseStatusError, ParseTaskTypeError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of execution a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Compute a change plan without applying it.
    Plan,
    /// Plan and apply infrastructure changes.
    Apply,
    /// Tear down managed infrastructure.
    Destroy,
    /// Run a policy-compliance scan.
    Scan,
}

impl TaskType {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Apply => "apply",
            Self::Destroy => "destroy",
            Self::Scan => "scan",
        }
    }

    /// Returns `true` for task types that mutate infrastructure.
    #[must_use]
    pub const fn is_deploy(self) -> bool {
        matches!(self, Self::Apply | Self::Destroy)
    }
}

impl TryFrom<&str> for TaskType {
    type Error = ParseTaskTypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "plan" => Ok(Self::Plan),
            "apply" => Ok(Self::Apply),
            "destroy" => Ok(Self::Destroy),
            "scan" => Ok(Self::Scan),
            _ => Err(ParseTaskTypeError(value.to_owned())),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is committed but no step has started.
    Pending,
    /// A step is executing on a worker.
    Running,
    /// The review step is waiting for approval.
    Approving,
    /// Every step completed.
    Complete,
    /// A step failed.
    Failed,
    /// A step exceeded the step timeout.
    Timeout,
    /// Execution was cancelled.
    Cancelled,
}

impl TaskStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Approving => "approving",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns `true` when no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Complete | Self::Failed | Self::Timeout | Self::Cancelled
        )
    }

    /// Returns `true` when moving from `self` to `target` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        match self {
            Self::Pending => matches!(
                target,
                Self::Running | Self::Approving | Self::Failed | Self::Cancelled
            ),
            Self::Running => matches!(
                target,
                Self::Approving | Self::Complete | Self::Failed | Self::Timeout | Self::Cancelled
            ),
            Self::Approving => matches!(
                target,
                Self::Running | Self::Complete | Self::Failed | Self::Cancelled
            ),
            Self::Complete | Self::Failed | Self::Timeout | Self::Cancelled => false,
        }
    }
}

impl TryFrom<&str> for TaskStatus {
    type Error = ParseStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "approving" => Ok(Self::Approving),
            "complete" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            "timeout" => Ok(Self::Timeout),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ParseStatusError(value.to_owned())),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step has not started.
    Pending,
    /// Step is executing.
    Running,
    /// Review step waiting for approval.
    Approving,
    /// Step finished successfully.
    Complete,
    /// Step finished with an error.
    Failed,
    /// Step exceeded the step timeout.
    Timeout,
    /// Step was cancelled while running or awaiting approval.
    Cancelled,
    /// Step never ran because an earlier step did not complete.
    Skipped,
}

impl StepStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Approving => "approving",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Skipped => "skipped",
        }
    }

    /// Returns `true` when no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Complete | Self::Failed | Self::Timeout | Self::Cancelled | Self::Skipped
        )
    }

    /// Returns `true` when moving from `self` to `target` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        match self {
            Self::Pending => matches!(
                target,
                Self::Running | Self::Approving | Self::Skipped | Self::Cancelled
            ),
            Self::Running => matches!(
                target,
                Self::Complete | Self::Failed | Self::Timeout | Self::Cancelled
            ),
            Self::Approving => matches!(target, Self::Complete | Self::Failed | Self::Cancelled),
            Self::Complete | Self::Failed | Self::Timeout | Self::Cancelled | Self::Skipped => {
                false
            }
        }
    }
}

impl TryFrom<&str> for StepStatus {
    type Error = ParseStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "approving" => Ok(Self::Approving),
            "complete" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            "timeout" => Ok(Self::Timeout),
            "cancelled" => Ok(Self::Cancelled),
            "skipped" => Ok(Self::Skipped),
            _ => Err(ParseStatusError(value.to_owned())),
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
