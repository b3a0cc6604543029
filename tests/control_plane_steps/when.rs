//! When steps for control plane BDD scenarios.

use super::world::{ControlPlaneWorld, run_async};
use crate::test_helpers::{CollectingSink, deploy};
use rstest_bdd_macros::when;
use tokio_util::sync::CancellationToken;

#[when(r#"a deploy of type "{task_type}" is requested for the environment"#)]
fn request_task(world: &mut ControlPlaneWorld, task_type: String) -> Result<(), eyre::Report> {
    let request = deploy(world.environment()?, &task_type);
    world.last_request = Some(run_async(world.harness.plane.submit_task(request)));
    Ok(())
}

#[when("the scan results are reconciled")]
fn scan_results_reconciled(world: &mut ControlPlaneWorld) -> Result<(), eyre::Report> {
    let creation = match world.last_request.as_ref() {
        Some(Ok(creation)) => creation,
        Some(Err(err)) => eyre::bail!("scan request failed: {err}"),
        None => eyre::bail!("missing scan request in scenario world"),
    };
    world.results = run_async(world.harness.reconciled(creation.task.id()))?;
    Ok(())
}

#[when("the task log is followed from offset {offset:u64}")]
fn follow_log(world: &mut ControlPlaneWorld, offset: u64) -> Result<(), eyre::Report> {
    let task_id = world
        .existing_task
        .ok_or_else(|| eyre::eyre!("missing task in scenario world"))?;
    let task = run_async(world.harness.plane.task(task_id))?;
    let mut sink = CollectingSink::default();
    let end = run_async(world.harness.plane.follow(
        &task,
        offset,
        &mut sink,
        CancellationToken::new(),
    ));
    world.sessions.push((end, sink));
    Ok(())
}
