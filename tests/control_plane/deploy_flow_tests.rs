//! Deploy, review and cancel flows through the control plane.

use crate::test_helpers::{Harness, Overrides, build_harness_with, deploy, harness, template};
use async_trait::async_trait;
use caisson::error::ErrorKind;
use caisson::runner::adapters::StepBehaviour;
use caisson::runner::ports::RunnerSelector;
use caisson::task::domain::{
    RunnerId, StepName, StepStatus, Task, TaskStatus, TemplateStatus, UserId,
};
use eyre::{OptionExt, ensure};
use rstest::rstest;
use std::sync::Arc;
use tokio::sync::Notify;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn completed_apply_releases_the_environment(harness: Harness) -> eyre::Result<()> {
    let environment = harness
        .seed(&template(), |env| env.with_auto_approval(true))
        .await?;

    let creation = harness.plane.submit_task(deploy(&environment, "apply")).await?;
    let task = harness.finished(creation.task.id()).await?;

    ensure!(task.status() == TaskStatus::Complete, "status {:?}", task.status());
    let offsets: Vec<u64> = task.steps().iter().map(|step| step.log_offset).collect();
    ensure!(offsets == vec![0, 9, 18], "offsets {offsets:?}");
    let log = harness.plane.read_log(task.id(), 0).await?;
    ensure!(
        log == b"init: ok\nplan: ok\napply: ok\n",
        "log {}",
        String::from_utf8_lossy(&log)
    );
    let stored = harness.environment(&environment).await?;
    ensure!(!stored.is_deploying(), "environment still locked");
    ensure!(stored.last_task_id() == Some(task.id()), "last task not recorded");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_step_skips_the_rest_of_the_flow(harness: Harness) -> eyre::Result<()> {
    let environment = harness.seed(&template(), |env| env).await?;
    harness.worker.set_behaviour(
        StepName::Plan,
        StepBehaviour::Fail {
            lines: vec!["plan: error".to_owned()],
            exit_code: 1,
            message: "plan exited 1".to_owned(),
        },
    )?;

    let creation = harness.plane.submit_task(deploy(&environment, "destroy")).await?;
    let task = harness.finished(creation.task.id()).await?;

    ensure!(task.status() == TaskStatus::Failed, "status {:?}", task.status());
    let statuses: Vec<StepStatus> = task.steps().iter().map(|step| step.status).collect();
    ensure!(
        statuses == vec![StepStatus::Complete, StepStatus::Failed, StepStatus::Skipped],
        "steps {statuses:?}"
    );
    ensure!(
        harness.worker.started_steps(task.id())? == vec![StepName::Init, StepName::Plan],
        "destroy must not start"
    );
    ensure!(
        !harness.environment(&environment).await?.is_deploying(),
        "environment still locked"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn review_waits_for_approval(harness: Harness) -> eyre::Result<()> {
    let environment = harness.seed(&template(), |env| env).await?;

    let creation = harness.plane.submit_task(deploy(&environment, "apply")).await?;
    let task_id = creation.task.id();
    harness.reached(task_id, TaskStatus::Approving).await?;
    ensure!(
        harness.worker.started_steps(task_id)? == vec![StepName::Init, StepName::Plan],
        "apply started before approval"
    );

    harness.plane.approve(task_id, UserId::new()).await?;
    let task = harness.finished(task_id).await?;

    ensure!(task.status() == TaskStatus::Complete, "status {:?}", task.status());
    ensure!(
        harness.worker.started_steps(task_id)?
            == vec![StepName::Init, StepName::Plan, StepName::Apply],
        "apply did not run after approval"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn approving_a_finished_task_conflicts(harness: Harness) -> eyre::Result<()> {
    let environment = harness.seed(&template(), |env| env).await?;
    let creation = harness.plane.submit_task(deploy(&environment, "plan")).await?;
    harness.finished(creation.task.id()).await?;

    let err = harness
        .plane
        .approve(creation.task.id(), UserId::new())
        .await
        .err()
        .ok_or_else(|| eyre::eyre!("approval of a finished plan succeeded"))?;

    ensure!(err.kind() == ErrorKind::Conflict, "kind {:?}", err.kind());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancel_aborts_the_running_step(harness: Harness) -> eyre::Result<()> {
    let environment = harness.seed(&template(), |env| env).await?;
    harness
        .worker
        .set_behaviour(StepName::Plan, StepBehaviour::Hang(vec!["planning".to_owned()]))?;
    let creation = harness.plane.submit_task(deploy(&environment, "plan")).await?;
    let task_id = creation.task.id();
    harness
        .wait_until(task_id, |task| {
            task.steps()
                .get(1)
                .is_some_and(|step| step.status == StepStatus::Running)
        })
        .await?;

    let user = UserId::new();
    harness.plane.cancel(task_id, user).await?;
    let task = harness.finished(task_id).await?;
    let repeated = harness.plane.cancel(task_id, user).await?;

    ensure!(task.status() == TaskStatus::Cancelled, "status {:?}", task.status());
    ensure!(repeated.status() == TaskStatus::Cancelled, "repeat changed state");
    ensure!(harness.worker.abort_count(task_id)? == 1, "abort not sent once");
    let log = harness.plane.read_log(task_id, 0).await?;
    ensure!(
        log == b"init: ok\nplanning\naborted\n",
        "log {}",
        String::from_utf8_lossy(&log)
    );
    ensure!(
        !harness.environment(&environment).await?.is_deploying(),
        "environment still locked"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_deploys_admit_exactly_one(harness: Harness) -> eyre::Result<()> {
    let environment = harness.seed(&template(), |env| env).await?;
    harness
        .worker
        .set_behaviour(StepName::Plan, StepBehaviour::Hang(Vec::new()))?;

    let (first, second) = tokio::join!(
        harness.plane.submit_task(deploy(&environment, "plan")),
        harness.plane.submit_task(deploy(&environment, "plan")),
    );

    let (admitted, rejected) = match (first, second) {
        (Ok(creation), Err(err)) | (Err(err), Ok(creation)) => (creation, err),
        (first, second) => eyre::bail!("expected one success: {first:?} / {second:?}"),
    };
    ensure!(rejected.kind() == ErrorKind::Conflict, "kind {:?}", rejected.kind());
    ensure!(
        harness.environment(&environment).await?.last_task_id() == Some(admitted.task.id()),
        "environment points at the wrong task"
    );
    harness.plane.cancel(admitted.task.id(), UserId::new()).await?;
    harness.finished(admitted.task.id()).await?;
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn disabled_template_creates_nothing(harness: Harness) -> eyre::Result<()> {
    let environment = harness
        .seed(&template().with_status(TemplateStatus::Disabled), |env| env)
        .await?;

    let err = harness
        .plane
        .submit_task(deploy(&environment, "apply"))
        .await
        .err()
        .ok_or_else(|| eyre::eyre!("disabled template accepted"))?;

    ensure!(err.kind() == ErrorKind::Conflict, "kind {:?}", err.kind());
    let stored = harness.environment(&environment).await?;
    ensure!(!stored.is_deploying(), "environment locked");
    ensure!(stored.last_task_id().is_none(), "task row created");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unreachable_worker_fails_the_task(harness: Harness) -> eyre::Result<()> {
    let environment = harness.seed(&template(), |env| env).await?;
    harness
        .worker
        .set_behaviour(StepName::Init, StepBehaviour::Refuse)?;

    let err = harness
        .plane
        .submit_task(deploy(&environment, "plan"))
        .await
        .err()
        .ok_or_else(|| eyre::eyre!("dispatch to a refusing worker succeeded"))?;

    ensure!(err.kind() == ErrorKind::Transport, "kind {:?}", err.kind());
    let stored = harness.environment(&environment).await?;
    let task_id = stored
        .last_task_id()
        .ok_or_else(|| eyre::eyre!("task row missing"))?;
    ensure!(
        harness.plane.task(task_id).await?.status() == TaskStatus::Failed,
        "task not failed"
    );
    ensure!(!stored.is_deploying(), "environment still locked");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn log_read_past_the_end_is_empty(harness: Harness) -> eyre::Result<()> {
    let environment = harness.seed(&template(), |env| env).await?;
    let creation = harness.plane.submit_task(deploy(&environment, "plan")).await?;
    let task = harness.finished(creation.task.id()).await?;

    ensure!(
        harness.plane.read_log(task.id(), 9).await? == b"plan: ok\n",
        "suffix mismatch"
    );
    ensure!(
        harness.plane.read_log(task.id(), 1024).await?.is_empty(),
        "read past end returned content"
    );
    Ok(())
}

/// Parks runner selection until the test lets it through.
struct GatedSelector {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl RunnerSelector for GatedSelector {
    async fn select(&self, _task: &Task) -> Option<RunnerId> {
        self.entered.notify_one();
        self.release.notified().await;
        RunnerId::new("local").ok()
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancel_before_dispatch_is_not_undone() -> eyre::Result<()> {
    let gate = Arc::new(GatedSelector {
        entered: Notify::new(),
        release: Notify::new(),
    });
    let harness = build_harness_with(Overrides {
        selector: Some(Arc::clone(&gate) as Arc<dyn RunnerSelector>),
        ..Overrides::default()
    });
    let environment = harness.seed(&template(), |env| env).await?;
    let submission = {
        let plane = harness.plane.clone();
        let request = deploy(&environment, "plan");
        tokio::spawn(async move { plane.submit_task(request).await })
    };

    gate.entered.notified().await;
    let task_id = harness
        .environment(&environment)
        .await?
        .last_task_id()
        .ok_or_eyre("task not committed")?;
    let cancelled = harness.plane.cancel(task_id, UserId::new()).await?;
    gate.release.notify_one();
    let creation = submission.await??;

    ensure!(cancelled.status() == TaskStatus::Cancelled, "status {:?}", cancelled.status());
    ensure!(
        creation.task.status() == TaskStatus::Cancelled,
        "submission revived the task as {:?}",
        creation.task.status()
    );
    ensure!(harness.worker.started_steps(task_id)?.is_empty(), "worker ran a cancelled task");
    ensure!(
        !harness.environment(&environment).await?.is_deploying(),
        "environment relocked"
    );

    gate.release.notify_one();
    let second = harness.plane.submit_task(deploy(&environment, "plan")).await?;
    let finished = harness.finished(second.task.id()).await?;

    ensure!(finished.status() == TaskStatus::Complete, "status {:?}", finished.status());
    ensure!(
        harness.plane.task(task_id).await?.status() == TaskStatus::Cancelled,
        "first task left its terminal state"
    );
    Ok(())
}
