//! Per-(task, policy) result rows.

use super::{Policy, PolicyId, PolicyResultStatus, ResultOutcome, Violation};
use crate::task::domain::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a result row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyResultId(Uuid);

impl PolicyResultId {
    /// Creates a new random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for PolicyResultId {
    fn default() -> Self {
        Self::new()
    }
}

/// Verdict row for one policy evaluated by one scan task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyResult {
    /// Row identifier.
    pub id: PolicyResultId,
    /// Owning scan task.
    pub task_id: TaskId,
    /// Evaluated policy.
    pub policy_id: PolicyId,
    /// Group of the evaluated policy.
    pub policy_group_id: String,
    /// Current verdict.
    pub status: PolicyResultStatus,
    /// Violation detail when `status` is violated.
    pub violation: Option<Violation>,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

impl PolicyResult {
    /// Creates the seed row for `policy`.
    #[must_use]
    pub fn seed(task_id: TaskId, policy: &Policy, suppressed: bool, now: DateTime<Utc>) -> Self {
        Self {
            id: PolicyResultId::new(),
            task_id,
            policy_id: policy.id.clone(),
            policy_group_id: policy.group_id.clone(),
            status: if suppressed {
                PolicyResultStatus::Suppressed
            } else {
                PolicyResultStatus::Pending
            },
            violation: None,
            updated_at: now,
        }
    }

    /// Applies a reported verdict. Suppressed rows never change.
    pub fn apply(&mut self, outcome: &ResultOutcome, now: DateTime<Utc>) {
        if self.status == PolicyResultStatus::Suppressed {
            return;
        }
        match outcome {
            ResultOutcome::Violated(violation) => {
                self.status = PolicyResultStatus::Violated;
                self.violation = Some(violation.as_ref().clone());
            }
            ResultOutcome::Passed => {
                self.status = PolicyResultStatus::Passed;
                self.violation = None;
            }
        }
        self.updated_at = now;
    }

    /// Moves a still-pending row to failed.
    pub fn finalize(&mut self, now: DateTime<Utc>) {
        if self.status == PolicyResultStatus::Pending {
            self.status = PolicyResultStatus::Failed;
            self.updated_at = now;
        }
    }
}

/// Row counts after a reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    /// Rows violated.
    pub violated: usize,
    /// Rows passed.
    pub passed: usize,
    /// Rows finalized as failed.
    pub failed: usize,
    /// Rows left suppressed.
    pub suppressed: usize,
}

impl ReconcileSummary {
    /// Counts the final status of `results`.
    #[must_use]
    pub fn of<'a>(results: impl IntoIterator<Item = &'a PolicyResult>) -> Self {
        results
            .into_iter()
            .fold(Self::default(), |mut summary, result| {
                match result.status {
                    PolicyResultStatus::Violated => summary.violated += 1,
                    PolicyResultStatus::Passed => summary.passed += 1,
                    PolicyResultStatus::Failed => summary.failed += 1,
                    PolicyResultStatus::Suppressed => summary.suppressed += 1,
                    PolicyResultStatus::Pending => {}
                }
                summary
            })
    }
}
