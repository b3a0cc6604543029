//! Steps and the flow builder.

use super::{ParseStatusError, StepStatus, TaskType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of one phase in a task flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    /// Materialize the workspace and initialize the tool.
    Init,
    /// Compute the change plan.
    Plan,
    /// Wait for a human to approve the plan.
    Review,
    /// Apply the plan.
    Apply,
    /// Destroy managed resources.
    Destroy,
    /// Evaluate compliance policies.
    Scan,
}

impl StepName {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Plan => "plan",
            Self::Review => "review",
            Self::Apply => "apply",
            Self::Destroy => "destroy",
            Self::Scan => "scan",
        }
    }

    /// Returns `true` for steps executed by a worker rather than a human.
    #[must_use]
    pub const fn runs_on_worker(self) -> bool {
        !matches!(self, Self::Review)
    }
}

impl TryFrom<&str> for StepName {
    type Error = ParseStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "init" => Ok(Self::Init),
            "plan" => Ok(Self::Plan),
            "review" => Ok(Self::Review),
            "apply" => Ok(Self::Apply),
            "destroy" => Ok(Self::Destroy),
            "scan" => Ok(Self::Scan),
            _ => Err(ParseStatusError(value.to_owned())),
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the ordered step flow for a task type.
///
/// The review step is only inserted into apply flows when the environment
/// does not auto-approve.
#[must_use]
pub fn build_flow(task_type: TaskType, auto_approve: bool) -> Vec<StepName> {
    match task_type {
        TaskType::Plan => vec![StepName::Init, StepName::Plan],
        TaskType::Apply if auto_approve => {
            vec![StepName::Init, StepName::Plan, StepName::Apply]
        }
        TaskType::Apply => vec![
            StepName::Init,
            StepName::Plan,
            StepName::Review,
            StepName::Apply,
        ],
        TaskType::Destroy => vec![StepName::Init, StepName::Plan, StepName::Destroy],
        TaskType::Scan => vec![StepName::Init, StepName::Scan],
    }
}

/// One phase of a task flow with its own status and log position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Step name.
    pub name: StepName,
    /// Step status.
    pub status: StepStatus,
    /// Byte offset into the task log where this step's output begins.
    pub log_offset: u64,
    /// Time the step started.
    pub started_at: Option<DateTime<Utc>>,
    /// Time the step reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure or outcome detail reported for the step.
    pub message: Option<String>,
}

impl Step {
    /// Creates a pending step.
    #[must_use]
    pub const fn pending(name: StepName) -> Self {
        Self {
            name,
            status: StepStatus::Pending,
            log_offset: 0,
            started_at: None,
            finished_at: None,
            message: None,
        }
    }
}
