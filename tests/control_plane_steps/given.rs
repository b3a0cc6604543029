//! Given steps for control plane BDD scenarios.

use super::world::{ControlPlaneWorld, run_async};
use crate::test_helpers::{REPORT, deploy, template};
use caisson::runner::adapters::StepBehaviour;
use caisson::scan::domain::ScanTarget;
use caisson::task::domain::{StepName, TaskStatus, TemplateStatus};
use eyre::WrapErr;
use rstest_bdd_macros::given;

#[given("an environment whose template is disabled")]
fn environment_with_disabled_template(world: &mut ControlPlaneWorld) -> Result<(), eyre::Report> {
    let template = template().with_status(TemplateStatus::Disabled);
    let environment = run_async(world.harness.seed(&template, |env| env))
        .wrap_err("seed environment with disabled template")?;
    world.environment = Some(environment);
    Ok(())
}

#[given(r#"an environment with a running "{task_type}" task"#)]
fn environment_with_running_task(
    world: &mut ControlPlaneWorld,
    task_type: String,
) -> Result<(), eyre::Report> {
    world
        .harness
        .worker
        .set_behaviour(StepName::Plan, StepBehaviour::Hang(Vec::new()))?;
    let environment = run_async(world.harness.seed(&template(), |env| env))?;
    let creation = run_async(world.harness.plane.submit_task(deploy(&environment, &task_type)))
        .wrap_err("submit the first task")?;
    run_async(world.harness.reached(creation.task.id(), TaskStatus::Running))?;
    world.existing_task = Some(creation.task.id());
    world.environment = Some(environment);
    Ok(())
}

#[given(r#"an environment with a finished "{task_type}" task"#)]
fn environment_with_finished_task(
    world: &mut ControlPlaneWorld,
    task_type: String,
) -> Result<(), eyre::Report> {
    let environment = run_async(world.harness.seed(&template(), |env| env))?;
    let creation = run_async(world.harness.plane.submit_task(deploy(&environment, &task_type)))
        .wrap_err("submit the task")?;
    run_async(world.harness.finished(creation.task.id()))?;
    world.existing_task = Some(creation.task.id());
    world.environment = Some(environment);
    Ok(())
}

#[given("an environment bound to policies P1, P2 and P3")]
fn environment_with_policies(world: &mut ControlPlaneWorld) -> Result<(), eyre::Report> {
    let environment = run_async(world.harness.seed(&template(), |env| env))?;
    world
        .harness
        .bind_policies(ScanTarget::Environment(environment.id()))?;
    world.environment = Some(environment);
    Ok(())
}

#[given("the scan tool reports P1 violated and P2 passed")]
fn scan_tool_report(world: &mut ControlPlaneWorld) -> Result<(), eyre::Report> {
    world.harness.worker.set_scan_output(REPORT)?;
    Ok(())
}
