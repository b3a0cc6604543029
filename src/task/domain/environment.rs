//! Deployment environments and their single-writer lock.

use super::{EnvironmentId, RunnerId, TaskId, TemplateId};
use serde::{Deserialize, Serialize};

/// Deployment target bound to one template.
///
/// `deploying` is the environment lock: it stays set while the task recorded
/// in `last_task_id` is non-terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    id: EnvironmentId,
    template_id: TemplateId,
    name: String,
    archived: bool,
    deploying: bool,
    last_task_id: Option<TaskId>,
    auto_approval: bool,
    runner_id: Option<RunnerId>,
    step_timeout_secs: Option<u64>,
}

/// Parameter object for reconstructing a persisted environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedEnvironmentData {
    /// Persisted identifier.
    pub id: EnvironmentId,
    /// Template deployed into the environment.
    pub template_id: TemplateId,
    /// Display name.
    pub name: String,
    /// Whether the environment is archived.
    pub archived: bool,
    /// Whether a task currently holds the environment.
    pub deploying: bool,
    /// Most recent task created for the environment.
    pub last_task_id: Option<TaskId>,
    /// Whether apply flows skip review.
    pub auto_approval: bool,
    /// Runner pinned to the environment.
    pub runner_id: Option<RunnerId>,
    /// Step timeout override in seconds.
    pub step_timeout_secs: Option<u64>,
}

impl Environment {
    /// Creates an idle environment for a template.
    #[must_use]
    pub fn new(template_id: TemplateId, name: impl Into<String>) -> Self {
        Self {
            id: EnvironmentId::new(),
            template_id,
            name: name.into(),
            archived: false,
            deploying: false,
            last_task_id: None,
            auto_approval: false,
            runner_id: None,
            step_timeout_secs: None,
        }
    }

    /// Reconstructs an environment from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedEnvironmentData) -> Self {
        Self {
            id: data.id,
            template_id: data.template_id,
            name: data.name,
            archived: data.archived,
            deploying: data.deploying,
            last_task_id: data.last_task_id,
            auto_approval: data.auto_approval,
            runner_id: data.runner_id,
            step_timeout_secs: data.step_timeout_secs,
        }
    }

    /// Enables or disables automatic approval.
    #[must_use]
    pub const fn with_auto_approval(mut self, enabled: bool) -> Self {
        self.auto_approval = enabled;
        self
    }

    /// Pins the environment to a runner.
    #[must_use]
    pub fn with_runner(mut self, runner_id: RunnerId) -> Self {
        self.runner_id = Some(runner_id);
        self
    }

    /// Overrides the template step timeout.
    #[must_use]
    pub const fn with_step_timeout_secs(mut self, secs: u64) -> Self {
        self.step_timeout_secs = Some(secs);
        self
    }

    /// Returns the environment identifier.
    #[must_use]
    pub const fn id(&self) -> EnvironmentId {
        self.id
    }

    /// Returns the template reference.
    #[must_use]
    pub const fn template_id(&self) -> TemplateId {
        self.template_id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` when the environment is archived.
    #[must_use]
    pub const fn is_archived(&self) -> bool {
        self.archived
    }

    /// Returns `true` while a task holds the environment.
    #[must_use]
    pub const fn is_deploying(&self) -> bool {
        self.deploying
    }

    /// Returns the most recent task, if any.
    #[must_use]
    pub const fn last_task_id(&self) -> Option<TaskId> {
        self.last_task_id
    }

    /// Returns `true` when apply flows skip review.
    #[must_use]
    pub const fn auto_approval(&self) -> bool {
        self.auto_approval
    }

    /// Returns the pinned runner, if any.
    #[must_use]
    pub const fn runner_id(&self) -> Option<&RunnerId> {
        self.runner_id.as_ref()
    }

    /// Returns the step timeout override, if any.
    #[must_use]
    pub const fn step_timeout_secs(&self) -> Option<u64> {
        self.step_timeout_secs
    }

    /// Marks the environment archived.
    pub const fn archive(&mut self) {
        self.archived = true;
    }

    /// Takes the environment lock for `task_id`.
    ///
    /// Callers check [`Environment::is_archived`] and
    /// [`Environment::is_deploying`] under the same transaction first.
    pub const fn lock_for(&mut self, task_id: TaskId) {
        self.deploying = true;
        self.last_task_id = Some(task_id);
    }

    /// Releases the lock when it is held by `task_id`.
    ///
    /// Returns `false` when a different task holds the lock.
    pub fn release_for(&mut self, task_id: TaskId) -> bool {
        if self.last_task_id != Some(task_id) {
            return false;
        }
        self.deploying = false;
        true
    }
}
