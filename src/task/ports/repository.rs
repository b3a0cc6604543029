//! Repository port for tasks and the environments they lock.

use crate::task::domain::{Environment, EnvironmentId, Task, TaskId, Template, TemplateId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for task repository operations.
pub type TaskRepositoryResult<T> = Result<T, TaskRepositoryError>;

/// Rows written atomically when a task is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCreation {
    /// Task being created.
    pub task: Task,
    /// Mirror scan shadowing `task`, if the template requires one.
    pub mirror: Option<Task>,
}

/// Task persistence contract.
///
/// Every method that touches more than one row runs in a single
/// transaction: either all of its writes become visible or none do.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Inserts or replaces a template.
    async fn save_template(&self, template: &Template) -> TaskRepositoryResult<()>;

    /// Inserts or replaces an environment.
    async fn save_environment(&self, environment: &Environment) -> TaskRepositoryResult<()>;

    /// Finds a template by identifier.
    async fn find_template(&self, id: TemplateId) -> TaskRepositoryResult<Option<Template>>;

    /// Finds an environment by identifier.
    async fn find_environment(
        &self,
        id: EnvironmentId,
    ) -> TaskRepositoryResult<Option<Environment>>;

    /// Commits a new task.
    ///
    /// When the task references an environment and is not a mirror, the
    /// environment is locked (`deploying = true`, `last_task_id = task`) in
    /// the same transaction. The lock is a conditional write, so concurrent
    /// callers racing on one environment see exactly one success.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::EnvArchived`] or
    /// [`TaskRepositoryError::EnvDeploying`] when the environment cannot be
    /// locked, [`TaskRepositoryError::EnvironmentNotFound`] when it does not
    /// exist and [`TaskRepositoryError::DuplicateTask`] for a reused id.
    async fn create_task(&self, creation: &TaskCreation) -> TaskRepositoryResult<()>;

    /// Persists step and status changes of a running task.
    ///
    /// The write only applies while the stored task is non-terminal.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] when the task does not exist
    /// and [`TaskRepositoryError::AlreadyTerminal`] when the stored task has
    /// already finished.
    async fn update_task(&self, task: &Task) -> TaskRepositoryResult<()>;

    /// Persists a terminal task and releases the environment lock it holds.
    ///
    /// The environment is only released when its `last_task_id` is this
    /// task. The first terminal write wins; later ones are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] when the task does not exist
    /// and [`TaskRepositoryError::AlreadyTerminal`] when the stored task has
    /// already finished.
    async fn complete_task(&self, task: &Task) -> TaskRepositoryResult<()>;

    /// Finds a task by identifier.
    async fn find_by_id(&self, id: TaskId) -> TaskRepositoryResult<Option<Task>>;

    /// Finds the mirror scan created alongside a deploy task.
    async fn find_mirror_scan(&self, deploy_task: TaskId) -> TaskRepositoryResult<Option<Task>>;
}

/// Errors returned by task repository implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskRepositoryError {
    /// A task with the same identifier already exists.
    #[error("duplicate task identifier: {0}")]
    DuplicateTask(TaskId),

    /// The task was not found.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// The stored task already reached a terminal state.
    #[error("task {0} has already finished")]
    AlreadyTerminal(TaskId),

    /// The environment was not found.
    #[error("environment not found: {0}")]
    EnvironmentNotFound(EnvironmentId),

    /// The environment is archived.
    #[error("environment {0} is archived")]
    EnvArchived(EnvironmentId),

    /// The environment already has a non-terminal task.
    #[error("environment {0} is already deploying")]
    EnvDeploying(EnvironmentId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
