//! Task creation, approval and termination.

use crate::error::ErrorKind;
use crate::task::{
    domain::{
        Environment, EnvironmentId, ExecutionSnapshot, NewTaskParams, RunnerId, Task,
        TaskDomainError, TaskId, TaskStatus, TaskType, Template, TemplateId, UserId,
    },
    ports::{
        AccessControl, AccessError, Action, Resource, TaskCreation, TaskRepository,
        TaskRepositoryError,
    },
};
use crate::vcs::{VcsError, VcsRegistry};
use mockable::Clock;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Per-request overrides of template and environment defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOptions {
    /// Terraform variable file.
    pub tf_vars_file: Option<String>,
    /// Ansible variable file.
    pub play_vars_file: Option<String>,
    /// Ansible playbook.
    pub playbook: Option<String>,
    /// Resource address filters.
    pub targets: Vec<String>,
    /// Extra variables.
    pub variables: BTreeMap<String, String>,
    /// Step timeout in seconds.
    pub step_timeout_secs: Option<u64>,
    /// Explicit runner.
    pub runner_id: Option<String>,
    /// Branch, tag or revision to deploy instead of the template default.
    pub reference: Option<String>,
}

/// Request payload for creating an environment task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTaskRequest {
    /// Environment to deploy.
    pub environment_id: EnvironmentId,
    /// Raw task type as received; validated by the service.
    pub task_type: Option<String>,
    /// Requesting user.
    pub creator: UserId,
    /// Overrides.
    pub options: TaskOptions,
}

/// Request payload for creating a scan task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateScanRequest {
    /// Template to scan.
    pub template_id: TemplateId,
    /// Environment to scan; a template-scoped scan when absent.
    pub environment_id: Option<EnvironmentId>,
    /// Requesting user.
    pub creator: UserId,
    /// Overrides.
    pub options: TaskOptions,
}

/// Service-level errors for task lifecycle operations.
#[derive(Debug, Error)]
pub enum TaskLifecycleError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),
    /// Repository operation failed.
    #[error(transparent)]
    Repository(#[from] TaskRepositoryError),
    /// Authorization failed.
    #[error(transparent)]
    Access(#[from] AccessError),
    /// Source revision could not be resolved.
    #[error(transparent)]
    Vcs(#[from] VcsError),
    /// The environment does not exist.
    #[error("environment not found: {0}")]
    EnvironmentNotFound(EnvironmentId),
    /// The template does not exist.
    #[error("template not found: {0}")]
    TemplateNotFound(TemplateId),
    /// The task does not exist.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    /// The environment is archived.
    #[error("environment {0} is archived")]
    EnvArchived(EnvironmentId),
    /// The environment already has a non-terminal task.
    #[error("environment {0} is already deploying")]
    EnvDeploying(EnvironmentId),
    /// The template is disabled.
    #[error("template {0} is disabled")]
    TemplateDisabled(TemplateId),
    /// The request is malformed.
    #[error("bad parameter: {0}")]
    BadParam(String),
    /// The task has no review step awaiting approval.
    #[error("task {0} is not awaiting approval")]
    TaskNotApproving(TaskId),
}

impl TaskLifecycleError {
    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Domain(
                TaskDomainError::InvalidRunnerId(_)
                | TaskDomainError::MissingTaskType
                | TaskDomainError::EmptyTemplateName
                | TaskDomainError::ZeroStepTimeout,
            )
            | Self::BadParam(_) => ErrorKind::Validation,
            Self::Domain(_)
            | Self::EnvArchived(_)
            | Self::EnvDeploying(_)
            | Self::TemplateDisabled(_)
            | Self::TaskNotApproving(_) => ErrorKind::Conflict,
            Self::Repository(err) => repository_kind(err),
            Self::Access(AccessError::Denied { .. }) => ErrorKind::Forbidden,
            Self::Access(AccessError::Persistence(_)) => ErrorKind::Persistence,
            Self::Vcs(VcsError::Transport(_)) => ErrorKind::Transport,
            Self::Vcs(_) => ErrorKind::Validation,
            Self::EnvironmentNotFound(_) | Self::TemplateNotFound(_) | Self::TaskNotFound(_) => {
                ErrorKind::NotFound
            }
        }
    }
}

const fn repository_kind(err: &TaskRepositoryError) -> ErrorKind {
    match err {
        TaskRepositoryError::DuplicateTask(_)
        | TaskRepositoryError::AlreadyTerminal(_)
        | TaskRepositoryError::EnvArchived(_)
        | TaskRepositoryError::EnvDeploying(_) => ErrorKind::Conflict,
        TaskRepositoryError::NotFound(_) | TaskRepositoryError::EnvironmentNotFound(_) => {
            ErrorKind::NotFound
        }
        TaskRepositoryError::Persistence(_) => ErrorKind::Persistence,
    }
}

/// Result type for task lifecycle service operations.
pub type TaskLifecycleResult<T> = Result<T, TaskLifecycleError>;

/// Task lifecycle orchestration service.
pub struct TaskLifecycleService<R, C>
where
    R: TaskRepository + ?Sized,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    vcs: Arc<VcsRegistry>,
    access: Arc<dyn AccessControl>,
    clock: Arc<C>,
    default_step_timeout_secs: u64,
}

impl<R, C> Clone for TaskLifecycleService<R, C>
where
    R: TaskRepository + ?Sized,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            vcs: Arc::clone(&self.vcs),
            access: Arc::clone(&self.access),
            clock: Arc::clone(&self.clock),
            default_step_timeout_secs: self.default_step_timeout_secs,
        }
    }
}

impl<R, C> TaskLifecycleService<R, C>
where
    R: TaskRepository + ?Sized,
    C: Clock + Send + Sync,
{
    /// Creates a new task lifecycle service.
    #[must_use]
    pub fn new(
        repository: Arc<R>,
        vcs: Arc<VcsRegistry>,
        access: Arc<dyn AccessControl>,
        clock: Arc<C>,
        default_step_timeout_secs: u64,
    ) -> Self {
        Self {
            repository,
            vcs,
            access,
            clock,
            default_step_timeout_secs,
        }
    }

    /// Creates and commits a task for an environment.
    ///
    /// Checks run in order: environment exists, caller authorized, not
    /// archived, not deploying, template exists, template enabled, task
    /// type valid. Nothing is written unless every check passes, and the
    /// task row and environment lock are committed together.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError`] classified by [`TaskLifecycleError::kind`].
    pub async fn create_task(&self, request: CreateTaskRequest) -> TaskLifecycleResult<TaskCreation> {
        let environment = self
            .repository
            .find_environment(request.environment_id)
            .await?
            .ok_or(TaskLifecycleError::EnvironmentNotFound(request.environment_id))?;
        let action = match request.task_type.as_deref().map(TaskType::try_from) {
            Some(Ok(TaskType::Destroy)) => Action::Destroy,
            Some(Ok(TaskType::Scan)) => Action::Scan,
            _ => Action::Deploy,
        };
        self.access
            .authorize(request.creator, action, Resource::Environment(environment.id()))
            .await?;

        if environment.is_archived() {
            return Err(TaskLifecycleError::EnvArchived(environment.id()));
        }
        if environment.is_deploying() {
            return Err(TaskLifecycleError::EnvDeploying(environment.id()));
        }
        let template = self.enabled_template(environment.template_id()).await?;
        let task_type = parse_task_type(request.task_type.as_deref())?;

        let params = self
            .task_params(
                task_type,
                &template,
                Some(&environment),
                request.creator,
                request.options,
            )
            .await?;
        let task = Task::new(params, &*self.clock)?;
        let mirror = (template.policy_enabled()
            && matches!(task_type, TaskType::Plan | TaskType::Apply))
        .then(|| Task::new_mirror_scan(&task, &*self.clock));
        let creation = TaskCreation { task, mirror };

        self.repository
            .create_task(&creation)
            .await
            .map_err(|err| match err {
                TaskRepositoryError::EnvArchived(id) => TaskLifecycleError::EnvArchived(id),
                TaskRepositoryError::EnvDeploying(id) => TaskLifecycleError::EnvDeploying(id),
                other => TaskLifecycleError::Repository(other),
            })?;

        info!(
            task_id = %creation.task.id(),
            env_id = %environment.id(),
            task_type = %task_type,
            mirror_id = ?creation.mirror.as_ref().map(Task::id),
            "task created"
        );
        Ok(creation)
    }

    /// Creates and commits a scan task.
    ///
    /// Environment-scoped scans go through [`Self::create_task`] and lock
    /// the environment; template-scoped scans lock nothing.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError`] classified by [`TaskLifecycleError::kind`].
    pub async fn create_scan_task(&self, request: CreateScanRequest) -> TaskLifecycleResult<Task> {
        if let Some(environment_id) = request.environment_id {
            let creation = self
                .create_task(CreateTaskRequest {
                    environment_id,
                    task_type: Some(TaskType::Scan.as_str().to_owned()),
                    creator: request.creator,
                    options: request.options,
                })
                .await?;
            return Ok(creation.task);
        }

        self.access
            .authorize(
                request.creator,
                Action::Scan,
                Resource::Template(request.template_id),
            )
            .await?;
        let template = self.enabled_template(request.template_id).await?;
        let params = self
            .task_params(
                TaskType::Scan,
                &template,
                None,
                request.creator,
                request.options,
            )
            .await?;
        let task = Task::new(params, &*self.clock)?;
        let creation = TaskCreation { task, mirror: None };
        self.repository.create_task(&creation).await?;

        info!(
            task_id = %creation.task.id(),
            template_id = %template.id(),
            "template scan task created"
        );
        Ok(creation.task)
    }

    /// Approves the review step of a task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::TaskNotApproving`] unless the review
    /// step is awaiting approval.
    pub async fn approve(&self, task_id: TaskId, approver: UserId) -> TaskLifecycleResult<Task> {
        self.access
            .authorize(approver, Action::Approve, Resource::Task(task_id))
            .await?;
        let mut task = self.require_task(task_id).await?;
        task.approve(&*self.clock).map_err(|err| match err {
            TaskDomainError::NotAwaitingApproval(id) => TaskLifecycleError::TaskNotApproving(id),
            other => TaskLifecycleError::Domain(other),
        })?;
        self.repository.update_task(&task).await?;
        info!(task_id = %task_id, approver = %approver, "review approved");
        Ok(task)
    }

    /// Checks that `user` may cancel `task_id`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Access`] when denied and
    /// [`TaskLifecycleError::TaskNotFound`] for an unknown task.
    pub async fn authorize_cancel(&self, task_id: TaskId, user: UserId) -> TaskLifecycleResult<Task> {
        self.access
            .authorize(user, Action::Cancel, Resource::Task(task_id))
            .await?;
        self.require_task(task_id).await
    }

    /// Ends a task that is not executing anywhere and releases its
    /// environment.
    ///
    /// Returns the stored task when it is already terminal, including when
    /// another writer finishes it first.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::TaskNotFound`] for an unknown task and
    /// propagates repository failures.
    pub async fn terminate(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        message: Option<String>,
    ) -> TaskLifecycleResult<Task> {
        let mut task = self.require_task(task_id).await?;
        if !task.terminate(status, message, &*self.clock)? {
            return Ok(task);
        }
        match self.repository.complete_task(&task).await {
            Ok(()) => {
                warn!(task_id = %task_id, status = %status, "task terminated outside execution");
                Ok(task)
            }
            Err(TaskRepositoryError::AlreadyTerminal(_)) => self.require_task(task_id).await,
            Err(err) => Err(err.into()),
        }
    }

    /// Finds a task by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Repository`] when lookup fails.
    pub async fn find_task(&self, task_id: TaskId) -> TaskLifecycleResult<Option<Task>> {
        Ok(self.repository.find_by_id(task_id).await?)
    }

    /// Finds the mirror scan of a deploy task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Repository`] when lookup fails.
    pub async fn find_mirror_scan(&self, task_id: TaskId) -> TaskLifecycleResult<Option<Task>> {
        Ok(self.repository.find_mirror_scan(task_id).await?)
    }

    async fn require_task(&self, task_id: TaskId) -> TaskLifecycleResult<Task> {
        self.repository
            .find_by_id(task_id)
            .await?
            .ok_or(TaskLifecycleError::TaskNotFound(task_id))
    }

    async fn enabled_template(&self, template_id: TemplateId) -> TaskLifecycleResult<Template> {
        let template = self
            .repository
            .find_template(template_id)
            .await?
            .ok_or(TaskLifecycleError::TemplateNotFound(template_id))?;
        if template.is_disabled() {
            return Err(TaskLifecycleError::TemplateDisabled(template_id));
        }
        Ok(template)
    }

    async fn task_params(
        &self,
        task_type: TaskType,
        template: &Template,
        environment: Option<&Environment>,
        creator: UserId,
        options: TaskOptions,
    ) -> TaskLifecycleResult<NewTaskParams> {
        let runner_id = match options.runner_id {
            Some(raw) => Some(RunnerId::new(raw)?),
            None => environment.and_then(Environment::runner_id).cloned(),
        };
        let defaults = template.defaults();
        let step_timeout_secs = options
            .step_timeout_secs
            .or_else(|| environment.and_then(Environment::step_timeout_secs))
            .or(defaults.step_timeout_secs)
            .unwrap_or(self.default_step_timeout_secs);

        let source = template.source();
        let reference = options
            .reference
            .unwrap_or_else(|| source.reference.clone());
        let revision = self
            .vcs
            .resolve_revision(source.provider, &source.repository, &reference)
            .await?;

        let snapshot = ExecutionSnapshot {
            repo_addr: source.address.clone(),
            revision,
            workdir: defaults.workdir.clone(),
            tf_vars_file: options.tf_vars_file.or_else(|| defaults.tf_vars_file.clone()),
            play_vars_file: options
                .play_vars_file
                .or_else(|| defaults.play_vars_file.clone()),
            playbook: options.playbook.or_else(|| defaults.playbook.clone()),
            targets: options.targets,
            variables: options.variables,
        };

        Ok(NewTaskParams {
            task_type,
            template_id: template.id(),
            environment_id: environment.map(Environment::id),
            creator,
            runner_id,
            snapshot,
            step_timeout_secs,
            auto_approve: environment.is_some_and(Environment::auto_approval),
        })
    }
}

fn parse_task_type(raw: Option<&str>) -> TaskLifecycleResult<TaskType> {
    let value = raw
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| TaskLifecycleError::BadParam("task type must be provided".to_owned()))?;
    TaskType::try_from(value).map_err(|err| TaskLifecycleError::BadParam(err.to_string()))
}
