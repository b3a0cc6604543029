//! Persistence of per-task policy result rows.

use crate::scan::domain::{PolicyId, PolicyResult, ReconcileSummary, ResultUpdate};
use crate::task::domain::TaskId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for policy result repository operations.
pub type PolicyResultResult<T> = Result<T, PolicyResultError>;

/// Policy result persistence contract.
#[async_trait]
pub trait PolicyResultRepository: Send + Sync {
    /// Inserts the seed rows of a scan task in one batch.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyResultError::AlreadySeeded`] when the task already
    /// has result rows; nothing is written in that case.
    async fn seed(&self, task_id: TaskId, rows: &[PolicyResult]) -> PolicyResultResult<()>;

    /// Applies `updates` in order and then fails every row still pending.
    ///
    /// Suppressed rows are left untouched. The whole reconciliation is one
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyResultError::MissingResult`] when an update names a
    /// policy without a seeded row; nothing is written in that case.
    async fn reconcile(
        &self,
        task_id: TaskId,
        updates: &[ResultUpdate],
        now: DateTime<Utc>,
    ) -> PolicyResultResult<ReconcileSummary>;

    /// Returns the rows of a task ordered by policy id.
    async fn find_by_task(&self, task_id: TaskId) -> PolicyResultResult<Vec<PolicyResult>>;
}

/// Errors returned by policy result repository implementations.
#[derive(Debug, Clone, Error)]
pub enum PolicyResultError {
    /// The task already has result rows.
    #[error("scan results for task {0} are already seeded")]
    AlreadySeeded(TaskId),

    /// The report names a policy that was never seeded for the task.
    #[error("no result row for policy {policy_id} in task {task_id}")]
    MissingResult {
        /// Scan task.
        task_id: TaskId,
        /// Reported policy.
        policy_id: PolicyId,
    },

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl PolicyResultError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
