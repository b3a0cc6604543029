//! Scan tasks and policy result reconciliation through the control plane.

use crate::test_helpers::{
    Harness, Overrides, REPORT, build_harness_with, deploy, harness, status_of, template,
};
use async_trait::async_trait;
use caisson::runner::adapters::StepBehaviour;
use caisson::scan::adapters::memory::InMemoryPolicyResultRepository;
use caisson::scan::domain::{
    PolicyId, PolicyResult, PolicyResultStatus, ReconcileSummary, ResultUpdate, ScanTarget,
};
use caisson::scan::ports::{PolicyResultError, PolicyResultRepository, PolicyResultResult};
use caisson::task::domain::{StepName, TaskId, TaskStatus, TaskType, UserId};
use caisson::task::services::{CreateScanRequest, TaskOptions};
use chrono::{DateTime, Utc};
use eyre::{OptionExt, ensure};
use rstest::rstest;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn mirror_scan_reconciles_reported_and_missing_policies(
    harness: Harness,
) -> eyre::Result<()> {
    let environment = harness
        .seed(&template().with_policy_enabled(true), |env| env)
        .await?;
    harness.bind_policies(ScanTarget::Environment(environment.id()))?;
    harness.worker.set_scan_output(REPORT)?;

    let creation = harness.plane.submit_task(deploy(&environment, "plan")).await?;
    let mirror = creation.mirror.ok_or_eyre("plan on a policy template has no mirror")?;
    ensure!(mirror.task_type() == TaskType::Scan, "mirror type {:?}", mirror.task_type());
    ensure!(mirror.mirror_of() == Some(creation.task.id()), "mirror link missing");

    let finished = harness.finished(mirror.id()).await?;
    let results = harness.reconciled(mirror.id()).await?;

    ensure!(finished.status() == TaskStatus::Complete, "status {:?}", finished.status());
    ensure!(results.len() == 3, "{} rows", results.len());
    ensure!(status_of(&results, "P1") == Some(PolicyResultStatus::Violated), "P1");
    ensure!(status_of(&results, "P2") == Some(PolicyResultStatus::Passed), "P2");
    ensure!(status_of(&results, "P3") == Some(PolicyResultStatus::Failed), "P3");
    let violation = results
        .iter()
        .find(|row| row.policy_id.as_str() == "P1")
        .and_then(|row| row.violation.as_ref())
        .ok_or_eyre("P1 carries no violation detail")?;
    ensure!(violation.file == "main.tf", "file {}", violation.file);
    ensure!(violation.line == 12, "line {}", violation.line);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn template_scan_uses_template_policies(harness: Harness) -> eyre::Result<()> {
    let template = template();
    harness.seed(&template, |env| env).await?;
    harness.bind_policies(ScanTarget::Template(template.id()))?;
    harness.worker.set_scan_output(REPORT)?;

    let task = harness
        .plane
        .submit_scan(CreateScanRequest {
            template_id: template.id(),
            environment_id: None,
            creator: UserId::new(),
            options: TaskOptions::default(),
        })
        .await?;
    let results = harness.reconciled(task.id()).await?;

    ensure!(task.environment_id().is_none(), "template scan bound to an environment");
    ensure!(
        harness.worker.started_steps(task.id())? == vec![StepName::Init, StepName::Scan],
        "scan flow"
    );
    ensure!(status_of(&results, "P3") == Some(PolicyResultStatus::Failed), "P3");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_scan_finalizes_every_policy_as_failed(harness: Harness) -> eyre::Result<()> {
    let environment = harness.seed(&template(), |env| env).await?;
    harness.bind_policies(ScanTarget::Environment(environment.id()))?;
    harness.worker.set_scan_output(REPORT)?;
    harness.worker.set_behaviour(
        StepName::Scan,
        StepBehaviour::Fail {
            lines: vec!["scan: crashed".to_owned()],
            exit_code: 2,
            message: "terrascan exited 2".to_owned(),
        },
    )?;

    let creation = harness.plane.submit_task(deploy(&environment, "scan")).await?;
    let task = harness.finished(creation.task.id()).await?;
    let results = harness.reconciled(task.id()).await?;

    ensure!(task.status() == TaskStatus::Failed, "status {:?}", task.status());
    ensure!(
        results
            .iter()
            .all(|row| row.status == PolicyResultStatus::Failed),
        "results {results:?}"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn suppressed_policy_is_left_alone(harness: Harness) -> eyre::Result<()> {
    let environment = harness.seed(&template(), |env| env).await?;
    let target = ScanTarget::Environment(environment.id());
    harness.bind_policies(target)?;
    harness.catalog.suppress(target, PolicyId::new("P3"))?;
    harness.worker.set_scan_output(REPORT)?;

    let creation = harness.plane.submit_task(deploy(&environment, "scan")).await?;
    let results = harness.reconciled(creation.task.id()).await?;

    ensure!(status_of(&results, "P3") == Some(PolicyResultStatus::Suppressed), "P3");
    ensure!(status_of(&results, "P1") == Some(PolicyResultStatus::Violated), "P1");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unreadable_report_finalizes_pending_policies_as_failed(
    harness: Harness,
) -> eyre::Result<()> {
    let environment = harness.seed(&template(), |env| env).await?;
    harness.bind_policies(ScanTarget::Environment(environment.id()))?;
    harness.worker.set_scan_output("terrascan: panic: runtime error")?;

    let creation = harness.plane.submit_task(deploy(&environment, "scan")).await?;
    let task = harness.finished(creation.task.id()).await?;
    let results = harness.reconciled(task.id()).await?;

    ensure!(task.status() == TaskStatus::Complete, "status {:?}", task.status());
    ensure!(
        results
            .iter()
            .all(|row| row.status == PolicyResultStatus::Failed),
        "results {results:?}"
    );
    Ok(())
}

/// Fails the first `failures` reconciliations, then delegates.
struct FlakyResults {
    inner: InMemoryPolicyResultRepository,
    failures: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl PolicyResultRepository for FlakyResults {
    async fn seed(&self, task_id: TaskId, rows: &[PolicyResult]) -> PolicyResultResult<()> {
        self.inner.seed(task_id, rows).await
    }

    async fn reconcile(
        &self,
        task_id: TaskId,
        updates: &[ResultUpdate],
        now: DateTime<Utc>,
    ) -> PolicyResultResult<ReconcileSummary> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        if failing.is_ok() {
            return Err(PolicyResultError::persistence(std::io::Error::other(
                "connection reset",
            )));
        }
        self.inner.reconcile(task_id, updates, now).await
    }

    async fn find_by_task(&self, task_id: TaskId) -> PolicyResultResult<Vec<PolicyResult>> {
        self.inner.find_by_task(task_id).await
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn reconciliation_is_retried_after_persistence_failures() -> eyre::Result<()> {
    let results = Arc::new(FlakyResults {
        inner: InMemoryPolicyResultRepository::new(),
        failures: AtomicUsize::new(2),
        calls: AtomicUsize::new(0),
    });
    let harness = build_harness_with(Overrides {
        results: Some(Arc::clone(&results) as Arc<dyn PolicyResultRepository>),
        ..Overrides::default()
    });
    let environment = harness.seed(&template(), |env| env).await?;
    harness.bind_policies(ScanTarget::Environment(environment.id()))?;
    harness.worker.set_scan_output(REPORT)?;

    let creation = harness.plane.submit_task(deploy(&environment, "scan")).await?;
    let reconciled = harness.reconciled(creation.task.id()).await?;

    ensure!(status_of(&reconciled, "P1") == Some(PolicyResultStatus::Violated), "P1");
    ensure!(status_of(&reconciled, "P2") == Some(PolicyResultStatus::Passed), "P2");
    ensure!(status_of(&reconciled, "P3") == Some(PolicyResultStatus::Failed), "P3");
    let calls = results.calls.load(Ordering::SeqCst);
    ensure!(calls == 3, "reconcile attempts {calls}");
    Ok(())
}
