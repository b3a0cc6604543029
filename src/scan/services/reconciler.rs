//! Seeding and finalization of policy results for scan tasks.

use crate::error::ErrorKind;
use crate::scan::{
    domain::{PolicyResult, ReconcileSummary, ScanReport, ScanReportError, ScanTarget},
    ports::{PolicyCatalog, PolicyCatalogError, PolicyResultError, PolicyResultRepository},
};
use crate::task::domain::{Task, TaskId, TaskStatus, TaskType};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Service-level errors for scan reconciliation.
#[derive(Debug, Error)]
pub enum ScanReconcileError {
    /// Policy lookup failed.
    #[error(transparent)]
    Catalog(#[from] PolicyCatalogError),
    /// Result persistence failed.
    #[error(transparent)]
    Results(#[from] PolicyResultError),
    /// The scan output could not be parsed.
    #[error(transparent)]
    Report(#[from] ScanReportError),
    /// The task is not a scan task.
    #[error("task {0} is not a scan task")]
    NotScanTask(TaskId),
}

impl ScanReconcileError {
    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Catalog(PolicyCatalogError::Persistence(_))
            | Self::Results(PolicyResultError::Persistence(_)) => ErrorKind::Persistence,
            Self::Results(PolicyResultError::AlreadySeeded(_)) => ErrorKind::Conflict,
            Self::Results(PolicyResultError::MissingResult { .. }) => {
                ErrorKind::DataInconsistency
            }
            Self::Report(_) => ErrorKind::Execution,
            Self::NotScanTask(_) => ErrorKind::Validation,
        }
    }
}

/// Result type for scan reconciliation.
pub type ScanReconcileResult<T> = Result<T, ScanReconcileError>;

/// Seeds and finalizes per-policy results of scan tasks.
pub struct ScanResultReconciler<C>
where
    C: Clock + Send + Sync,
{
    catalog: Arc<dyn PolicyCatalog>,
    results: Arc<dyn PolicyResultRepository>,
    clock: Arc<C>,
}

impl<C> Clone for ScanResultReconciler<C>
where
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            catalog: Arc::clone(&self.catalog),
            results: Arc::clone(&self.results),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<C> ScanResultReconciler<C>
where
    C: Clock + Send + Sync,
{
    /// Creates a reconciler over the given ports.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn PolicyCatalog>,
        results: Arc<dyn PolicyResultRepository>,
        clock: Arc<C>,
    ) -> Self {
        Self {
            catalog,
            results,
            clock,
        }
    }

    /// Creates one result row per policy applicable to the task.
    ///
    /// Policies come from the task's environment when it has one, otherwise
    /// from its template. Suppressed policies are seeded `suppressed`, the
    /// rest `pending`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanReconcileError::NotScanTask`] for deploy tasks and
    /// [`PolicyResultError::AlreadySeeded`] when called twice for one task.
    pub async fn init_scan_result(&self, task: &Task) -> ScanReconcileResult<Vec<PolicyResult>> {
        ensure_scan(task)?;
        let target = ScanTarget::for_task(task);
        let policies = self.catalog.policies_for(target).await?;
        let suppressed = self.catalog.suppressed_for(target).await?;
        let now = self.clock.utc();
        let rows: Vec<PolicyResult> = policies
            .iter()
            .map(|policy| PolicyResult::seed(task.id(), policy, suppressed.contains(&policy.id), now))
            .collect();
        self.results.seed(task.id(), &rows).await?;
        info!(
            task_id = %task.id(),
            target = target.kind(),
            policies = rows.len(),
            "scan results seeded"
        );
        Ok(rows)
    }

    /// Finalizes the result rows of a scan task from the tool output.
    ///
    /// Reported violations and passes are applied in report order, then
    /// every row still pending becomes `failed`. A scan that did not
    /// complete reconciles as if the tool reported nothing.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyResultError::MissingResult`] when the report names a
    /// policy that was never seeded, and [`ScanReconcileError::Report`]
    /// when a completed scan produced unparseable output.
    pub async fn update_scan_result(
        &self,
        task: &Task,
        output: Option<&str>,
    ) -> ScanReconcileResult<ReconcileSummary> {
        ensure_scan(task)?;
        let report = match output {
            Some(raw) if task.status() == TaskStatus::Complete => ScanReport::parse(raw)?,
            _ => {
                if task.status() != TaskStatus::Complete {
                    warn!(
                        task_id = %task.id(),
                        status = %task.status(),
                        "scan did not complete; finalizing pending results as failed"
                    );
                }
                ScanReport::default()
            }
        };
        let summary = self
            .results
            .reconcile(task.id(), &report.updates(), self.clock.utc())
            .await?;
        info!(
            task_id = %task.id(),
            violated = summary.violated,
            passed = summary.passed,
            failed = summary.failed,
            suppressed = summary.suppressed,
            "scan results reconciled"
        );
        Ok(summary)
    }

    /// Lists the result rows of a task.
    ///
    /// # Errors
    ///
    /// Propagates repository failures.
    pub async fn results_for(&self, task_id: TaskId) -> ScanReconcileResult<Vec<PolicyResult>> {
        Ok(self.results.find_by_task(task_id).await?)
    }
}

const fn ensure_scan(task: &Task) -> ScanReconcileResult<()> {
    match task.task_type() {
        TaskType::Scan => Ok(()),
        _ => Err(ScanReconcileError::NotScanTask(task.id())),
    }
}
