//! In-memory repository guards on finished tasks.

use super::fixtures::{params, template};
use crate::task::{
    adapters::memory::InMemoryTaskRepository,
    domain::{Environment, NewTaskParams, Task, TaskStatus, TaskType},
    ports::{TaskCreation, TaskRepository, TaskRepositoryError},
};
use eyre::{OptionExt, ensure};
use mockable::DefaultClock;
use rstest::{fixture, rstest};

struct Committed {
    repository: InMemoryTaskRepository,
    environment: Environment,
    task: Task,
}

#[fixture]
async fn committed() -> Committed {
    let repository = InMemoryTaskRepository::new();
    let template = template();
    let environment = Environment::new(template.id(), "prod");
    repository
        .save_template(&template)
        .await
        .expect("save template");
    repository
        .save_environment(&environment)
        .await
        .expect("save environment");
    let task = Task::new(
        NewTaskParams {
            template_id: template.id(),
            environment_id: Some(environment.id()),
            ..params(TaskType::Plan, true)
        },
        &DefaultClock,
    )
    .expect("valid task");
    repository
        .create_task(&TaskCreation {
            task: task.clone(),
            mirror: None,
        })
        .await
        .expect("commit task");
    Committed {
        repository,
        environment,
        task,
    }
}

impl Committed {
    async fn stored_status(&self) -> eyre::Result<TaskStatus> {
        Ok(self
            .repository
            .find_by_id(self.task.id())
            .await?
            .ok_or_eyre("task missing")?
            .status())
    }

    async fn deploying(&self) -> eyre::Result<bool> {
        Ok(self
            .repository
            .find_environment(self.environment.id())
            .await?
            .ok_or_eyre("environment missing")?
            .is_deploying())
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stale_progress_cannot_revive_a_cancelled_task(
    #[future] committed: Committed,
) -> eyre::Result<()> {
    let committed = committed.await;
    let mut running = committed.task.clone();
    running.start_step(0, 0, &DefaultClock)?;
    let mut cancelled = committed.task.clone();
    cancelled.terminate(TaskStatus::Cancelled, None, &DefaultClock)?;
    committed.repository.complete_task(&cancelled).await?;

    let result = committed.repository.update_task(&running).await;

    ensure!(
        matches!(result, Err(TaskRepositoryError::AlreadyTerminal(id)) if id == committed.task.id()),
        "unexpected result {result:?}"
    );
    ensure!(committed.stored_status().await? == TaskStatus::Cancelled, "status changed");
    ensure!(!committed.deploying().await?, "environment relocked");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn first_terminal_write_wins(#[future] committed: Committed) -> eyre::Result<()> {
    let committed = committed.await;
    let mut cancelled = committed.task.clone();
    cancelled.terminate(TaskStatus::Cancelled, None, &DefaultClock)?;
    let mut failed = committed.task.clone();
    failed.terminate(TaskStatus::Failed, Some("late".to_owned()), &DefaultClock)?;

    committed.repository.complete_task(&cancelled).await?;
    let result = committed.repository.complete_task(&failed).await;

    ensure!(
        matches!(result, Err(TaskRepositoryError::AlreadyTerminal(_))),
        "unexpected result {result:?}"
    );
    ensure!(committed.stored_status().await? == TaskStatus::Cancelled, "status changed");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn progress_on_a_live_task_is_persisted(#[future] committed: Committed) -> eyre::Result<()> {
    let committed = committed.await;
    let mut running = committed.task.clone();
    running.start_step(0, 0, &DefaultClock)?;

    committed.repository.update_task(&running).await?;

    ensure!(committed.stored_status().await? == TaskStatus::Running, "progress lost");
    ensure!(committed.deploying().await?, "lock released early");
    Ok(())
}
