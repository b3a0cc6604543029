//! Task aggregate root.

use super::{
    EnvironmentId, RunnerId, Step, StepName, StepStatus, TaskDomainError, TaskId, TaskStatus,
    TaskType, TemplateId, UserId, build_flow,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Workspace inputs captured when the task is created.
///
/// Later template or environment edits never change what a committed task
/// executes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    /// Repository clone address.
    pub repo_addr: String,
    /// Resolved source revision.
    pub revision: String,
    /// Working directory inside the repository.
    pub workdir: String,
    /// Terraform variable file, relative to the workdir.
    pub tf_vars_file: Option<String>,
    /// Ansible variable file, relative to the workdir.
    pub play_vars_file: Option<String>,
    /// Ansible playbook, relative to the workdir.
    pub playbook: Option<String>,
    /// Resource address filters passed to plan and apply.
    pub targets: Vec<String>,
    /// Extra variables exported to the step scripts.
    pub variables: BTreeMap<String, String>,
}

/// Parameter object for creating a task.
#[derive(Debug, Clone)]
pub struct NewTaskParams {
    /// Requested execution kind.
    pub task_type: TaskType,
    /// Template the task executes.
    pub template_id: TemplateId,
    /// Environment the task deploys, if any.
    pub environment_id: Option<EnvironmentId>,
    /// User that requested the task.
    pub creator: UserId,
    /// Explicit runner, if the request or environment names one.
    pub runner_id: Option<RunnerId>,
    /// Workspace inputs.
    pub snapshot: ExecutionSnapshot,
    /// Per-step timeout in seconds.
    pub step_timeout_secs: u64,
    /// Whether apply flows skip the review step.
    pub auto_approve: bool,
}

/// Task aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    task_type: TaskType,
    template_id: TemplateId,
    environment_id: Option<EnvironmentId>,
    mirror_of: Option<TaskId>,
    steps: Vec<Step>,
    status: TaskStatus,
    creator: UserId,
    runner_id: Option<RunnerId>,
    snapshot: ExecutionSnapshot,
    step_timeout_secs: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted task aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedTaskData {
    /// Persisted task identifier.
    pub id: TaskId,
    /// Persisted execution kind.
    pub task_type: TaskType,
    /// Persisted template reference.
    pub template_id: TemplateId,
    /// Persisted environment reference.
    pub environment_id: Option<EnvironmentId>,
    /// Deploy task shadowed by this scan, if any.
    pub mirror_of: Option<TaskId>,
    /// Persisted steps in flow order.
    pub steps: Vec<Step>,
    /// Persisted lifecycle state.
    pub status: TaskStatus,
    /// Persisted creator.
    pub creator: UserId,
    /// Persisted runner assignment.
    pub runner_id: Option<RunnerId>,
    /// Persisted workspace inputs.
    pub snapshot: ExecutionSnapshot,
    /// Persisted per-step timeout in seconds.
    pub step_timeout_secs: u64,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted latest lifecycle timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates a pending task with the flow derived from its type.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::ZeroStepTimeout`] when the step timeout is
    /// zero.
    pub fn new(params: NewTaskParams, clock: &impl Clock) -> Result<Self, TaskDomainError> {
        if params.step_timeout_secs == 0 {
            return Err(TaskDomainError::ZeroStepTimeout);
        }
        let timestamp = clock.utc();
        let steps = build_flow(params.task_type, params.auto_approve)
            .into_iter()
            .map(Step::pending)
            .collect();

        Ok(Self {
            id: TaskId::new(),
            task_type: params.task_type,
            template_id: params.template_id,
            environment_id: params.environment_id,
            mirror_of: None,
            steps,
            status: TaskStatus::Pending,
            creator: params.creator,
            runner_id: params.runner_id,
            snapshot: params.snapshot,
            step_timeout_secs: params.step_timeout_secs,
            created_at: timestamp,
            updated_at: timestamp,
        })
    }

    /// Creates the scan task that shadows a plan or apply task.
    #[must_use]
    pub fn new_mirror_scan(deploy: &Self, clock: &impl Clock) -> Self {
        let timestamp = clock.utc();
        Self {
            id: TaskId::new(),
            task_type: TaskType::Scan,
            template_id: deploy.template_id,
            environment_id: deploy.environment_id,
            mirror_of: Some(deploy.id),
            steps: build_flow(TaskType::Scan, true)
                .into_iter()
                .map(Step::pending)
                .collect(),
            status: TaskStatus::Pending,
            creator: deploy.creator,
            runner_id: deploy.runner_id.clone(),
            snapshot: deploy.snapshot.clone(),
            step_timeout_secs: deploy.step_timeout_secs,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Reconstructs a task from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedTaskData) -> Self {
        Self {
            id: data.id,
            task_type: data.task_type,
            template_id: data.template_id,
            environment_id: data.environment_id,
            mirror_of: data.mirror_of,
            steps: data.steps,
            status: data.status,
            creator: data.creator,
            runner_id: data.runner_id,
            snapshot: data.snapshot,
            step_timeout_secs: data.step_timeout_secs,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the execution kind.
    #[must_use]
    pub const fn task_type(&self) -> TaskType {
        self.task_type
    }

    /// Returns the template reference.
    #[must_use]
    pub const fn template_id(&self) -> TemplateId {
        self.template_id
    }

    /// Returns the environment reference, if any.
    #[must_use]
    pub const fn environment_id(&self) -> Option<EnvironmentId> {
        self.environment_id
    }

    /// Returns the deploy task this scan mirrors, if any.
    #[must_use]
    pub const fn mirror_of(&self) -> Option<TaskId> {
        self.mirror_of
    }

    /// Returns `true` when this task is a mirror scan.
    #[must_use]
    pub const fn is_mirror(&self) -> bool {
        self.mirror_of.is_some()
    }

    /// Returns the steps in flow order.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Returns the step names in flow order.
    #[must_use]
    pub fn flow(&self) -> Vec<StepName> {
        self.steps.iter().map(|step| step.name).collect()
    }

    /// Returns the task lifecycle state.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns `true` once the task can no longer change.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns the creator.
    #[must_use]
    pub const fn creator(&self) -> UserId {
        self.creator
    }

    /// Returns the explicitly assigned runner, if any.
    #[must_use]
    pub const fn runner_id(&self) -> Option<&RunnerId> {
        self.runner_id.as_ref()
    }

    /// Returns the captured workspace inputs.
    #[must_use]
    pub const fn snapshot(&self) -> &ExecutionSnapshot {
        &self.snapshot
    }

    /// Returns the per-step timeout.
    #[must_use]
    pub const fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    /// Returns the per-step timeout in seconds.
    #[must_use]
    pub const fn step_timeout_secs(&self) -> u64 {
        self.step_timeout_secs
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest lifecycle timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the first step that has not reached a terminal status.
    #[must_use]
    pub fn current_step(&self) -> Option<(usize, &Step)> {
        self.steps
            .iter()
            .enumerate()
            .find(|(_, step)| !step.status.is_terminal())
    }

    /// Records the assigned runner.
    pub fn assign_runner(&mut self, runner_id: RunnerId, clock: &impl Clock) {
        self.runner_id = Some(runner_id);
        self.touch(clock);
    }

    /// Starts the step at `index`, recording where its output begins.
    ///
    /// A review step enters [`StepStatus::Approving`] and moves the task to
    /// [`TaskStatus::Approving`]; every other step runs.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::StepNotFound`] for an unknown index,
    /// [`TaskDomainError::StepOutOfOrder`] when an earlier step has not
    /// completed, and transition errors when the task or step state forbids
    /// starting.
    pub fn start_step(
        &mut self,
        index: usize,
        log_offset: u64,
        clock: &impl Clock,
    ) -> Result<StepStatus, TaskDomainError> {
        let task_id = self.id;
        let predecessors_complete = self
            .steps
            .iter()
            .take(index)
            .all(|step| step.status == StepStatus::Complete);
        let step = self
            .steps
            .get(index)
            .ok_or(TaskDomainError::StepNotFound { task_id, index })?;
        if !predecessors_complete {
            return Err(TaskDomainError::StepOutOfOrder { task_id, index });
        }

        let (step_target, task_target) = if step.name == StepName::Review {
            (StepStatus::Approving, TaskStatus::Approving)
        } else {
            (StepStatus::Running, TaskStatus::Running)
        };
        ensure_step_transition(task_id, step.name, step.status, step_target)?;
        self.ensure_task_transition(task_target)?;

        let now = clock.utc();
        if let Some(step) = self.steps.get_mut(index) {
            step.status = step_target;
            step.log_offset = log_offset;
            step.started_at = Some(now);
        }
        self.status = task_target;
        self.updated_at = now;
        Ok(step_target)
    }

    /// Finishes the step at `index` with a terminal status.
    ///
    /// Completing the last step completes the task. Any other terminal
    /// status ends the task with the matching state and skips the remaining
    /// steps.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::StepNotFound`] for an unknown index and
    /// transition errors when the step is not active.
    pub fn finish_step(
        &mut self,
        index: usize,
        outcome: StepStatus,
        message: Option<String>,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        let task_id = self.id;
        let is_last = index + 1 == self.steps.len();
        let step = self
            .steps
            .get(index)
            .ok_or(TaskDomainError::StepNotFound { task_id, index })?;
        ensure_step_transition(task_id, step.name, step.status, outcome)?;

        let task_target = match outcome {
            StepStatus::Complete if is_last => Some(TaskStatus::Complete),
            StepStatus::Complete => None,
            StepStatus::Failed => Some(TaskStatus::Failed),
            StepStatus::Timeout => Some(TaskStatus::Timeout),
            _ => Some(TaskStatus::Cancelled),
        };
        if let Some(target) = task_target {
            self.ensure_task_transition(target)?;
        }

        let now = clock.utc();
        if let Some(step) = self.steps.get_mut(index) {
            step.status = outcome;
            step.finished_at = Some(now);
            step.message = message;
        }
        if let Some(target) = task_target {
            self.status = target;
            if target != TaskStatus::Complete {
                self.skip_pending_steps();
            }
        }
        self.updated_at = now;
        Ok(())
    }

    /// Approves the review step that is awaiting approval.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::NotAwaitingApproval`] unless the task is
    /// approving.
    pub fn approve(&mut self, clock: &impl Clock) -> Result<(), TaskDomainError> {
        let index = self
            .steps
            .iter()
            .position(|step| step.name == StepName::Review && step.status == StepStatus::Approving)
            .filter(|_| self.status == TaskStatus::Approving)
            .ok_or(TaskDomainError::NotAwaitingApproval(self.id))?;

        let now = clock.utc();
        if let Some(step) = self.steps.get_mut(index) {
            step.status = StepStatus::Complete;
            step.finished_at = Some(now);
        }
        self.status = if index + 1 == self.steps.len() {
            TaskStatus::Complete
        } else {
            TaskStatus::Running
        };
        self.updated_at = now;
        Ok(())
    }

    /// Ends the task with a terminal status regardless of which step is
    /// active.
    ///
    /// The active step takes the matching step status and every pending
    /// step is skipped. Returns `false` without changes when the task is
    /// already terminal.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] when `status` is
    /// not a failure status.
    pub fn terminate(
        &mut self,
        status: TaskStatus,
        message: Option<String>,
        clock: &impl Clock,
    ) -> Result<bool, TaskDomainError> {
        if self.status.is_terminal() {
            return Ok(false);
        }
        let step_status = match status {
            TaskStatus::Failed => StepStatus::Failed,
            TaskStatus::Timeout => StepStatus::Timeout,
            TaskStatus::Cancelled => StepStatus::Cancelled,
            _ => {
                return Err(TaskDomainError::InvalidStateTransition {
                    task_id: self.id,
                    from: self.status,
                    to: status,
                });
            }
        };
        self.ensure_task_transition(status)?;

        let now = clock.utc();
        let active = self
            .steps
            .iter_mut()
            .find(|step| matches!(step.status, StepStatus::Running | StepStatus::Approving));
        if let Some(step) = active {
            step.status = step_status;
            step.finished_at = Some(now);
            step.message = message;
        }
        self.status = status;
        self.skip_pending_steps();
        self.updated_at = now;
        Ok(true)
    }

    /// Cancels the task. Repeated calls are no-ops returning `false`.
    ///
    /// # Errors
    ///
    /// Propagates transition errors from [`Task::terminate`].
    pub fn cancel(&mut self, clock: &impl Clock) -> Result<bool, TaskDomainError> {
        self.terminate(TaskStatus::Cancelled, None, clock)
    }

    fn ensure_task_transition(&self, target: TaskStatus) -> Result<(), TaskDomainError> {
        if self.status == target || self.status.can_transition_to(target) {
            return Ok(());
        }
        Err(TaskDomainError::InvalidStateTransition {
            task_id: self.id,
            from: self.status,
            to: target,
        })
    }

    fn skip_pending_steps(&mut self) {
        for step in &mut self.steps {
            if step.status == StepStatus::Pending {
                step.status = StepStatus::Skipped;
            }
        }
    }

    /// Updates the `updated_at` timestamp to the current clock time.
    fn touch(&mut self, clock: &impl Clock) {
        self.updated_at = clock.utc();
    }
}

const fn ensure_step_transition(
    task_id: TaskId,
    step: StepName,
    from: StepStatus,
    to: StepStatus,
) -> Result<(), TaskDomainError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(TaskDomainError::InvalidStepTransition {
            task_id,
            step,
            from,
            to,
        })
    }
}
