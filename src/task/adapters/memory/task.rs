//! In-memory repository for tasks, environments and templates.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::task::{
    domain::{Environment, EnvironmentId, Task, TaskId, Template, TemplateId},
    ports::{TaskCreation, TaskRepository, TaskRepositoryError, TaskRepositoryResult},
};

/// Thread-safe in-memory task repository.
///
/// All rows live behind one lock, so every multi-row write is atomic.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskRepository {
    state: Arc<RwLock<InMemoryTaskState>>,
}

#[derive(Debug, Default)]
struct InMemoryTaskState {
    templates: HashMap<TemplateId, Template>,
    environments: HashMap<EnvironmentId, Environment>,
    tasks: HashMap<TaskId, Task>,
    mirror_index: HashMap<TaskId, TaskId>,
}

impl InMemoryTaskRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> TaskRepositoryResult<RwLockReadGuard<'_, InMemoryTaskState>> {
        self.state
            .read()
            .map_err(|err| TaskRepositoryError::persistence(std::io::Error::other(err.to_string())))
    }

    fn write(&self) -> TaskRepositoryResult<RwLockWriteGuard<'_, InMemoryTaskState>> {
        self.state
            .write()
            .map_err(|err| TaskRepositoryError::persistence(std::io::Error::other(err.to_string())))
    }
}

fn holds_lock(task: &Task) -> bool {
    task.environment_id().is_some() && !task.is_mirror()
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn save_template(&self, template: &Template) -> TaskRepositoryResult<()> {
        let mut state = self.write()?;
        state.templates.insert(template.id(), template.clone());
        Ok(())
    }

    async fn save_environment(&self, environment: &Environment) -> TaskRepositoryResult<()> {
        let mut state = self.write()?;
        state
            .environments
            .insert(environment.id(), environment.clone());
        Ok(())
    }

    async fn find_template(&self, id: TemplateId) -> TaskRepositoryResult<Option<Template>> {
        Ok(self.read()?.templates.get(&id).cloned())
    }

    async fn find_environment(
        &self,
        id: EnvironmentId,
    ) -> TaskRepositoryResult<Option<Environment>> {
        Ok(self.read()?.environments.get(&id).cloned())
    }

    async fn create_task(&self, creation: &TaskCreation) -> TaskRepositoryResult<()> {
        let mut state = self.write()?;
        let task = &creation.task;
        for candidate in std::iter::once(task).chain(creation.mirror.as_ref()) {
            if state.tasks.contains_key(&candidate.id()) {
                return Err(TaskRepositoryError::DuplicateTask(candidate.id()));
            }
        }

        if holds_lock(task)
            && let Some(environment_id) = task.environment_id()
        {
            let environment = state
                .environments
                .get_mut(&environment_id)
                .ok_or(TaskRepositoryError::EnvironmentNotFound(environment_id))?;
            if environment.is_archived() {
                return Err(TaskRepositoryError::EnvArchived(environment_id));
            }
            if environment.is_deploying() {
                return Err(TaskRepositoryError::EnvDeploying(environment_id));
            }
            environment.lock_for(task.id());
        }

        state.tasks.insert(task.id(), task.clone());
        if let Some(mirror) = &creation.mirror {
            state.mirror_index.insert(task.id(), mirror.id());
            state.tasks.insert(mirror.id(), mirror.clone());
        }
        Ok(())
    }

    async fn update_task(&self, task: &Task) -> TaskRepositoryResult<()> {
        let mut state = self.write()?;
        let stored = state
            .tasks
            .get_mut(&task.id())
            .ok_or(TaskRepositoryError::NotFound(task.id()))?;
        if stored.is_terminal() {
            return Err(TaskRepositoryError::AlreadyTerminal(task.id()));
        }
        *stored = task.clone();
        Ok(())
    }

    async fn complete_task(&self, task: &Task) -> TaskRepositoryResult<()> {
        let mut state = self.write()?;
        match state.tasks.get(&task.id()) {
            None => return Err(TaskRepositoryError::NotFound(task.id())),
            Some(stored) if stored.is_terminal() => {
                return Err(TaskRepositoryError::AlreadyTerminal(task.id()));
            }
            Some(_) => {}
        }
        if holds_lock(task)
            && let Some(environment) = task
                .environment_id()
                .and_then(|id| state.environments.get_mut(&id))
        {
            environment.release_for(task.id());
        }
        state.tasks.insert(task.id(), task.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: TaskId) -> TaskRepositoryResult<Option<Task>> {
        Ok(self.read()?.tasks.get(&id).cloned())
    }

    async fn find_mirror_scan(&self, deploy_task: TaskId) -> TaskRepositoryResult<Option<Task>> {
        let state = self.read()?;
        Ok(state
            .mirror_index
            .get(&deploy_task)
            .and_then(|mirror_id| state.tasks.get(mirror_id))
            .cloned())
    }
}
