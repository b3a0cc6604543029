//! `PostgreSQL` repository implementation for task lifecycle storage.

use super::{
    models::{EnvironmentRow, TaskProgressRow, TaskRow, TemplateRow},
    schema::{environments, tasks, templates},
};
use crate::task::{
    domain::{
        Environment, EnvironmentId, PersistedEnvironmentData, PersistedTaskData,
        PersistedTemplateData, RunnerId, Task, TaskId, TaskStatus, TaskType, Template,
        TemplateId, TemplateSource, TemplateStatus, UserId,
    },
    ports::{TaskCreation, TaskRepository, TaskRepositoryError, TaskRepositoryResult},
};
use crate::vcs::VcsProvider;
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// `PostgreSQL` connection pool type used by task adapters.
pub type TaskPgPool = Pool<ConnectionManager<PgConnection>>;

/// `PostgreSQL`-backed task repository.
#[derive(Debug, Clone)]
pub struct PostgresTaskRepository {
    pool: TaskPgPool,
}

/// Error carried out of a Diesel transaction closure.
enum TxError {
    Db(DieselError),
    Repository(TaskRepositoryError),
}

impl From<DieselError> for TxError {
    fn from(err: DieselError) -> Self {
        Self::Db(err)
    }
}

impl From<TaskRepositoryError> for TxError {
    fn from(err: TaskRepositoryError) -> Self {
        Self::Repository(err)
    }
}

impl PostgresTaskRepository {
    /// Creates a new repository from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: TaskPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> TaskRepositoryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> TaskRepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(TaskRepositoryError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(TaskRepositoryError::persistence)?
    }
}

#[async_trait]
impl TaskRepository for PostgresTaskRepository {
    async fn save_template(&self, template: &Template) -> TaskRepositoryResult<()> {
        let row = template_to_row(template)?;
        self.run_blocking(move |connection| {
            diesel::insert_into(templates::table)
                .values(&row)
                .on_conflict(templates::id)
                .do_update()
                .set(&row)
                .execute(connection)
                .map_err(TaskRepositoryError::persistence)?;
            Ok(())
        })
        .await
    }

    async fn save_environment(&self, environment: &Environment) -> TaskRepositoryResult<()> {
        let row = environment_to_row(environment)?;
        self.run_blocking(move |connection| {
            diesel::insert_into(environments::table)
                .values(&row)
                .on_conflict(environments::id)
                .do_update()
                .set(&row)
                .execute(connection)
                .map_err(TaskRepositoryError::persistence)?;
            Ok(())
        })
        .await
    }

    async fn find_template(&self, id: TemplateId) -> TaskRepositoryResult<Option<Template>> {
        self.run_blocking(move |connection| {
            let row = templates::table
                .filter(templates::id.eq(id.into_inner()))
                .select(TemplateRow::as_select())
                .first::<TemplateRow>(connection)
                .optional()
                .map_err(TaskRepositoryError::persistence)?;
            row.map(row_to_template).transpose()
        })
        .await
    }

    async fn find_environment(
        &self,
        id: EnvironmentId,
    ) -> TaskRepositoryResult<Option<Environment>> {
        self.run_blocking(move |connection| {
            let row = environments::table
                .filter(environments::id.eq(id.into_inner()))
                .select(EnvironmentRow::as_select())
                .first::<EnvironmentRow>(connection)
                .optional()
                .map_err(TaskRepositoryError::persistence)?;
            row.map(row_to_environment).transpose()
        })
        .await
    }

    async fn create_task(&self, creation: &TaskCreation) -> TaskRepositoryResult<()> {
        let task = &creation.task;
        let task_id = task.id();
        let lock_target = task.environment_id().filter(|_| !task.is_mirror());
        let mut rows = vec![task_to_row(task)?];
        if let Some(mirror) = &creation.mirror {
            rows.push(task_to_row(mirror)?);
        }

        self.run_blocking(move |connection| {
            connection
                .transaction::<_, TxError, _>(|tx| {
                    if let Some(environment_id) = lock_target {
                        lock_environment(tx, environment_id, task_id)?;
                    }
                    diesel::insert_into(tasks::table)
                        .values(&rows)
                        .execute(tx)
                        .map_err(|err| match err {
                            DieselError::DatabaseError(
                                DatabaseErrorKind::UniqueViolation,
                                ref info,
                            ) => match (info.constraint_name(), lock_target) {
                                (Some("idx_tasks_one_active_per_env"), Some(environment_id)) => {
                                    TxError::Repository(TaskRepositoryError::EnvDeploying(
                                        environment_id,
                                    ))
                                }
                                _ => TxError::Repository(TaskRepositoryError::DuplicateTask(
                                    task_id,
                                )),
                            },
                            other => TxError::Db(other),
                        })?;
                    Ok(())
                })
                .map_err(from_tx)
        })
        .await
    }

    async fn update_task(&self, task: &Task) -> TaskRepositoryResult<()> {
        let task_id = task.id();
        let progress = task_to_progress(task)?;
        self.run_blocking(move |connection| {
            let updated = diesel::update(
                tasks::table
                    .filter(tasks::id.eq(task_id.into_inner()))
                    .filter(tasks::status.eq_any(ACTIVE_STATUSES)),
            )
            .set(&progress)
            .execute(connection)
            .map_err(TaskRepositoryError::persistence)?;
            if updated == 0 {
                let missed =
                    missed_write(connection, task_id).map_err(TaskRepositoryError::persistence)?;
                return Err(missed);
            }
            Ok(())
        })
        .await
    }

    async fn complete_task(&self, task: &Task) -> TaskRepositoryResult<()> {
        let task_id = task.id();
        let progress = task_to_progress(task)?;
        let release_target = task.environment_id().filter(|_| !task.is_mirror());

        self.run_blocking(move |connection| {
            connection
                .transaction::<_, TxError, _>(|tx| {
                    let updated = diesel::update(
                        tasks::table
                            .filter(tasks::id.eq(task_id.into_inner()))
                            .filter(tasks::status.eq_any(ACTIVE_STATUSES)),
                    )
                    .set(&progress)
                    .execute(tx)?;
                    if updated == 0 {
                        return Err(TxError::Repository(missed_write(tx, task_id)?));
                    }
                    if let Some(environment_id) = release_target {
                        diesel::update(
                            environments::table
                                .filter(environments::id.eq(environment_id.into_inner()))
                                .filter(environments::last_task_id.eq(task_id.into_inner())),
                        )
                        .set(environments::deploying.eq(false))
                        .execute(tx)?;
                    }
                    Ok(())
                })
                .map_err(from_tx)
        })
        .await
    }

    async fn find_by_id(&self, id: TaskId) -> TaskRepositoryResult<Option<Task>> {
        self.run_blocking(move |connection| {
            let row = tasks::table
                .filter(tasks::id.eq(id.into_inner()))
                .select(TaskRow::as_select())
                .first::<TaskRow>(connection)
                .optional()
                .map_err(TaskRepositoryError::persistence)?;
            row.map(row_to_task).transpose()
        })
        .await
    }

    async fn find_mirror_scan(&self, deploy_task: TaskId) -> TaskRepositoryResult<Option<Task>> {
        self.run_blocking(move |connection| {
            let row = tasks::table
                .filter(tasks::mirror_of.eq(deploy_task.into_inner()))
                .select(TaskRow::as_select())
                .first::<TaskRow>(connection)
                .optional()
                .map_err(TaskRepositoryError::persistence)?;
            row.map(row_to_task).transpose()
        })
        .await
    }
}

/// Stored statuses a progress or terminal write may replace.
const ACTIVE_STATUSES: [&str; 3] = [
    TaskStatus::Pending.as_str(),
    TaskStatus::Running.as_str(),
    TaskStatus::Approving.as_str(),
];

/// Explains why a guarded task write matched no row.
fn missed_write(
    connection: &mut PgConnection,
    task_id: TaskId,
) -> Result<TaskRepositoryError, DieselError> {
    let exists = diesel::select(diesel::dsl::exists(
        tasks::table.filter(tasks::id.eq(task_id.into_inner())),
    ))
    .get_result::<bool>(connection)?;
    Ok(if exists {
        TaskRepositoryError::AlreadyTerminal(task_id)
    } else {
        TaskRepositoryError::NotFound(task_id)
    })
}

/// Takes the environment lock with a conditional write.
///
/// The `WHERE deploying = false AND archived = false` guard makes concurrent
/// lockers serialize on the row; only one sees an updated row.
fn lock_environment(
    tx: &mut PgConnection,
    environment_id: EnvironmentId,
    task_id: TaskId,
) -> Result<(), TxError> {
    let updated = diesel::update(
        environments::table
            .filter(environments::id.eq(environment_id.into_inner()))
            .filter(environments::deploying.eq(false))
            .filter(environments::archived.eq(false)),
    )
    .set((
        environments::deploying.eq(true),
        environments::last_task_id.eq(Some(task_id.into_inner())),
    ))
    .execute(tx)?;
    if updated == 1 {
        return Ok(());
    }

    let flags = environments::table
        .filter(environments::id.eq(environment_id.into_inner()))
        .select((environments::archived, environments::deploying))
        .first::<(bool, bool)>(tx)
        .optional()?;
    let err = match flags {
        None => TaskRepositoryError::EnvironmentNotFound(environment_id),
        Some((true, _)) => TaskRepositoryError::EnvArchived(environment_id),
        Some((false, _)) => TaskRepositoryError::EnvDeploying(environment_id),
    };
    Err(TxError::Repository(err))
}

fn from_tx(err: TxError) -> TaskRepositoryError {
    match err {
        TxError::Db(db) => TaskRepositoryError::persistence(db),
        TxError::Repository(repository) => repository,
    }
}

fn template_to_row(template: &Template) -> TaskRepositoryResult<TemplateRow> {
    let source = template.source();
    Ok(TemplateRow {
        id: template.id().into_inner(),
        name: template.name().to_owned(),
        status: template.status().as_str().to_owned(),
        vcs_provider: source.provider.as_str().to_owned(),
        repository: source.repository.clone(),
        reference: source.reference.clone(),
        repo_addr: source.address.clone(),
        defaults: serde_json::to_value(template.defaults())
            .map_err(TaskRepositoryError::persistence)?,
        policy_enabled: template.policy_enabled(),
    })
}

fn row_to_template(row: TemplateRow) -> TaskRepositoryResult<Template> {
    let status =
        TemplateStatus::try_from(row.status.as_str()).map_err(TaskRepositoryError::persistence)?;
    let provider = VcsProvider::try_from(row.vcs_provider.as_str())
        .map_err(TaskRepositoryError::persistence)?;
    let defaults =
        serde_json::from_value(row.defaults).map_err(TaskRepositoryError::persistence)?;
    Ok(Template::from_persisted(PersistedTemplateData {
        id: TemplateId::from_uuid(row.id),
        name: row.name,
        status,
        source: TemplateSource {
            provider,
            repository: row.repository,
            reference: row.reference,
            address: row.repo_addr,
        },
        defaults,
        policy_enabled: row.policy_enabled,
    }))
}

fn environment_to_row(environment: &Environment) -> TaskRepositoryResult<EnvironmentRow> {
    let step_timeout_secs = environment
        .step_timeout_secs()
        .map(i64::try_from)
        .transpose()
        .map_err(TaskRepositoryError::persistence)?;
    Ok(EnvironmentRow {
        id: environment.id().into_inner(),
        template_id: environment.template_id().into_inner(),
        name: environment.name().to_owned(),
        archived: environment.is_archived(),
        deploying: environment.is_deploying(),
        last_task_id: environment.last_task_id().map(TaskId::into_inner),
        auto_approval: environment.auto_approval(),
        runner_id: environment.runner_id().map(|id| id.as_str().to_owned()),
        step_timeout_secs,
    })
}

fn row_to_environment(row: EnvironmentRow) -> TaskRepositoryResult<Environment> {
    let runner_id = row
        .runner_id
        .map(RunnerId::new)
        .transpose()
        .map_err(TaskRepositoryError::persistence)?;
    let step_timeout_secs = row
        .step_timeout_secs
        .map(u64::try_from)
        .transpose()
        .map_err(TaskRepositoryError::persistence)?;
    Ok(Environment::from_persisted(PersistedEnvironmentData {
        id: EnvironmentId::from_uuid(row.id),
        template_id: TemplateId::from_uuid(row.template_id),
        name: row.name,
        archived: row.archived,
        deploying: row.deploying,
        last_task_id: row.last_task_id.map(TaskId::from_uuid),
        auto_approval: row.auto_approval,
        runner_id,
        step_timeout_secs,
    }))
}

fn task_to_row(task: &Task) -> TaskRepositoryResult<TaskRow> {
    Ok(TaskRow {
        id: task.id().into_inner(),
        task_type: task.task_type().as_str().to_owned(),
        template_id: task.template_id().into_inner(),
        environment_id: task.environment_id().map(EnvironmentId::into_inner),
        mirror_of: task.mirror_of().map(TaskId::into_inner),
        steps: serde_json::to_value(task.steps()).map_err(TaskRepositoryError::persistence)?,
        status: task.status().as_str().to_owned(),
        creator: task.creator().into_inner(),
        runner_id: task.runner_id().map(|id| id.as_str().to_owned()),
        snapshot: serde_json::to_value(task.snapshot())
            .map_err(TaskRepositoryError::persistence)?,
        step_timeout_secs: i64::try_from(task.step_timeout_secs())
            .map_err(TaskRepositoryError::persistence)?,
        created_at: task.created_at(),
        updated_at: task.updated_at(),
    })
}

fn task_to_progress(task: &Task) -> TaskRepositoryResult<TaskProgressRow> {
    Ok(TaskProgressRow {
        steps: serde_json::to_value(task.steps()).map_err(TaskRepositoryError::persistence)?,
        status: task.status().as_str().to_owned(),
        runner_id: task.runner_id().map(|id| id.as_str().to_owned()),
        updated_at: task.updated_at(),
    })
}

fn row_to_task(row: TaskRow) -> TaskRepositoryResult<Task> {
    let task_type =
        TaskType::try_from(row.task_type.as_str()).map_err(TaskRepositoryError::persistence)?;
    let status =
        TaskStatus::try_from(row.status.as_str()).map_err(TaskRepositoryError::persistence)?;
    let runner_id = row
        .runner_id
        .map(RunnerId::new)
        .transpose()
        .map_err(TaskRepositoryError::persistence)?;

    Ok(Task::from_persisted(PersistedTaskData {
        id: TaskId::from_uuid(row.id),
        task_type,
        template_id: TemplateId::from_uuid(row.template_id),
        environment_id: row.environment_id.map(EnvironmentId::from_uuid),
        mirror_of: row.mirror_of.map(TaskId::from_uuid),
        steps: serde_json::from_value(row.steps).map_err(TaskRepositoryError::persistence)?,
        status,
        creator: UserId::from_uuid(row.creator),
        runner_id,
        snapshot: serde_json::from_value(row.snapshot)
            .map_err(TaskRepositoryError::persistence)?,
        step_timeout_secs: u64::try_from(row.step_timeout_secs)
            .map_err(TaskRepositoryError::persistence)?,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }))
}
