//! Then steps for control plane BDD scenarios.

use super::world::{ControlPlaneWorld, run_async};
use crate::test_helpers::status_of;
use caisson::logs::domain::{CloseFrame, FollowEnd};
use caisson::scan::domain::PolicyResultStatus;
use rstest_bdd_macros::then;

#[then(r#"the request fails with a "{code}" error"#)]
fn request_fails(world: &ControlPlaneWorld, code: String) -> Result<(), eyre::Report> {
    match world.last_request.as_ref() {
        Some(Err(err)) if err.kind().as_str() == code => Ok(()),
        Some(Err(err)) => Err(eyre::eyre!(
            "expected {code} error, got {}: {err}",
            err.kind().as_str()
        )),
        Some(Ok(creation)) => Err(eyre::eyre!(
            "request unexpectedly created task {}",
            creation.task.id()
        )),
        None => Err(eyre::eyre!("missing request result")),
    }
}

#[then("the environment has no task and is not deploying")]
fn environment_untouched(world: &ControlPlaneWorld) -> Result<(), eyre::Report> {
    let stored = run_async(world.harness.environment(world.environment()?))?;
    if stored.is_deploying() || stored.last_task_id().is_some() {
        return Err(eyre::eyre!(
            "environment changed: deploying={}, last task={:?}",
            stored.is_deploying(),
            stored.last_task_id()
        ));
    }
    Ok(())
}

#[then("the environment is still locked by the running task")]
fn environment_still_locked(world: &ControlPlaneWorld) -> Result<(), eyre::Report> {
    let stored = run_async(world.harness.environment(world.environment()?))?;
    if !stored.is_deploying() || stored.last_task_id() != world.existing_task {
        return Err(eyre::eyre!(
            "expected lock by {:?}, found deploying={} last task={:?}",
            world.existing_task,
            stored.is_deploying(),
            stored.last_task_id()
        ));
    }
    Ok(())
}

#[then(r#"policy "{policy}" is "{status}""#)]
fn policy_status(
    world: &ControlPlaneWorld,
    policy: String,
    status: String,
) -> Result<(), eyre::Report> {
    let expected = PolicyResultStatus::try_from(status.as_str())
        .map_err(|err| eyre::eyre!("invalid expected status in scenario: {err}"))?;
    let actual = status_of(&world.results, &policy);
    if actual != Some(expected) {
        return Err(eyre::eyre!("policy {policy}: expected {status}, found {actual:?}"));
    }
    Ok(())
}

#[then("every session closed normally")]
fn sessions_closed_normally(world: &ControlPlaneWorld) -> Result<(), eyre::Report> {
    for (end, sink) in &world.sessions {
        if *end != FollowEnd::Completed
            || sink.close.as_ref().map(|frame| frame.code) != Some(CloseFrame::NORMAL)
        {
            return Err(eyre::eyre!("session ended {end:?} with {:?}", sink.close));
        }
    }
    Ok(())
}

#[then(r#"session {index:usize} delivered "{content}""#)]
fn session_delivered(
    world: &ControlPlaneWorld,
    index: usize,
    content: String,
) -> Result<(), eyre::Report> {
    let expected = content.replace("\\n", "\n");
    let (_, sink) = world
        .sessions
        .get(index.saturating_sub(1))
        .ok_or_else(|| eyre::eyre!("no session {index}"))?;
    if sink.content != expected.as_bytes() {
        return Err(eyre::eyre!(
            "session {index} delivered {:?}",
            String::from_utf8_lossy(&sink.content)
        ));
    }
    Ok(())
}
