//! Drives committed tasks through their steps on remote workers.

use super::{ApprovalGate, WorkerRegistry};
use crate::error::ErrorKind;
use crate::logs::{
    adapters::{LogError, LogStore},
    domain::LogLocation,
    ports::{ExitWaitError, TaskExitSource},
};
use crate::runner::{
    domain::{Assignment, AssignmentError, StepExitStatus, TaskExit},
    ports::{RunnerSelector, Worker, WorkerError},
};
use crate::task::{
    domain::{RunnerId, StepStatus, Task, TaskDomainError, TaskId, TaskStatus},
    ports::{TaskRepository, TaskRepositoryError},
};
use async_trait::async_trait;
use mockable::Clock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Service-level errors for dispatch and waiting.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Neither the task nor the pool names a runner.
    #[error("no runner available for task {0}")]
    NoRunner(TaskId),
    /// The runner is not registered.
    #[error("runner {0} is not registered")]
    UnknownRunner(RunnerId),
    /// The task is already being driven.
    #[error("task {0} is already dispatched")]
    AlreadyDispatched(TaskId),
    /// The task already reached a terminal state.
    #[error("task {0} is already terminal")]
    TaskTerminal(TaskId),
    /// The task does not exist.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    /// The caller stopped waiting.
    #[error("wait for task {0} cancelled")]
    WaitCancelled(TaskId),
    /// Worker call failed.
    #[error(transparent)]
    Worker(#[from] WorkerError),
    /// Step scripts could not be rendered.
    #[error(transparent)]
    Assignment(#[from] AssignmentError),
    /// Task state forbids the transition.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),
    /// Task persistence failed.
    #[error(transparent)]
    Repository(#[from] TaskRepositoryError),
    /// Log artifact preparation failed.
    #[error(transparent)]
    Logs(#[from] LogError),
}

impl DispatchError {
    /// Returns `true` when the task was finished by another writer, so
    /// there is nothing left to drive.
    #[must_use]
    pub const fn is_superseded(&self) -> bool {
        matches!(
            self,
            Self::TaskTerminal(_) | Self::Repository(TaskRepositoryError::AlreadyTerminal(_))
        )
    }

    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NoRunner(_) | Self::UnknownRunner(_) | Self::Worker(_) | Self::WaitCancelled(_) => {
                ErrorKind::Transport
            }
            Self::AlreadyDispatched(_)
            | Self::TaskTerminal(_)
            | Self::Domain(_)
            | Self::Repository(TaskRepositoryError::AlreadyTerminal(_)) => ErrorKind::Conflict,
            Self::TaskNotFound(_) | Self::Repository(TaskRepositoryError::NotFound(_)) => {
                ErrorKind::NotFound
            }
            Self::Assignment(_) => ErrorKind::Validation,
            Self::Repository(_) | Self::Logs(_) => ErrorKind::Persistence,
        }
    }
}

/// Result type for dispatcher operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Dispatcher timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherSettings {
    /// Interval between task state reads when waiting on a task driven
    /// elsewhere.
    pub poll_interval: Duration,
    /// Time a worker gets to flush and confirm an abort.
    pub abort_grace: Duration,
    /// Attempts at persisting a terminal state before giving up.
    pub persist_attempts: u32,
    /// Delay before the first persist retry; doubled on each further one.
    pub retry_backoff: Duration,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            abort_grace: Duration::from_secs(30),
            persist_attempts: 5,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

struct Control {
    cancel: CancellationToken,
    exit: watch::Receiver<Option<TaskExit>>,
}

struct Inner<C> {
    repository: Arc<dyn TaskRepository>,
    workers: WorkerRegistry,
    selector: Arc<dyn RunnerSelector>,
    logs: LogStore,
    gate: ApprovalGate,
    controls: Mutex<HashMap<TaskId, Control>>,
    unrecorded: Mutex<HashMap<TaskId, TaskExit>>,
    clock: Arc<C>,
    settings: DispatcherSettings,
}

enum StepFlow {
    Continue,
    Stop,
}

/// Hands committed tasks to workers and tracks them until they end.
///
/// Each dispatched task is driven by one background task that starts steps
/// in flow order, records the log offset at which each step's output
/// begins, and persists progress after every step. The terminal state and
/// the environment release are written together.
pub struct RunnerDispatcher<C>
where
    C: Clock + Send + Sync + 'static,
{
    inner: Arc<Inner<C>>,
}

impl<C> Clone for RunnerDispatcher<C>
where
    C: Clock + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> RunnerDispatcher<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(
        repository: Arc<dyn TaskRepository>,
        workers: WorkerRegistry,
        selector: Arc<dyn RunnerSelector>,
        logs: LogStore,
        clock: Arc<C>,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                repository,
                workers,
                selector,
                logs,
                gate: ApprovalGate::new(),
                controls: Mutex::new(HashMap::new()),
                unrecorded: Mutex::new(HashMap::new()),
                clock,
                settings,
            }),
        }
    }

    fn controls(&self) -> MutexGuard<'_, HashMap<TaskId, Control>> {
        self.inner
            .controls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn unrecorded(&self) -> MutexGuard<'_, HashMap<TaskId, TaskExit>> {
        self.inner
            .unrecorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Assigns `task` to a worker and starts driving it.
    ///
    /// The runner is the task's explicit runner, otherwise the selector's
    /// choice. The first step is started before returning, so an
    /// unreachable worker is reported here; retrying is up to the caller.
    /// Once the task is registered its stored state is read again, so a
    /// task finished while a runner was being chosen is never started.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NoRunner`] or [`DispatchError::UnknownRunner`]
    /// when no worker can be chosen, [`DispatchError::TaskTerminal`] when the
    /// task finished before it could start and [`DispatchError::Worker`]
    /// when the worker refuses the first step.
    pub async fn dispatch(&self, task: Task) -> DispatchResult<()> {
        let task_id = task.id();
        if task.is_terminal() {
            return Err(DispatchError::TaskTerminal(task_id));
        }
        let runner_id = match task.runner_id().cloned() {
            Some(runner_id) => runner_id,
            None => self
                .inner
                .selector
                .select(&task)
                .await
                .ok_or(DispatchError::NoRunner(task_id))?,
        };
        let worker = self
            .inner
            .workers
            .worker(&runner_id)
            .ok_or_else(|| DispatchError::UnknownRunner(runner_id.clone()))?;
        let assignment = Assignment::render(&task)?;
        self.inner.logs.ensure(LogLocation::for_task(&task)).await?;

        let (exit_sender, exit) = watch::channel(None);
        let cancel = CancellationToken::new();
        {
            let mut controls = self.controls();
            if controls.contains_key(&task_id) {
                return Err(DispatchError::AlreadyDispatched(task_id));
            }
            controls.insert(
                task_id,
                Control {
                    cancel: cancel.clone(),
                    exit,
                },
            );
        }

        let mut current = match self.active_task(task_id).await {
            Ok(current) => current,
            Err(err) => {
                self.controls().remove(&task_id);
                return Err(err);
            }
        };
        current.assign_runner(runner_id.clone(), &*self.inner.clock);
        if let Err(err) = self.start_step(&mut current, &*worker, &assignment, 0).await {
            self.controls().remove(&task_id);
            return Err(err);
        }
        info!(task_id = %task_id, runner = %runner_id, "task dispatched");

        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher
                .drive(current, worker, assignment, cancel, exit_sender)
                .await;
        });
        Ok(())
    }

    async fn active_task(&self, task_id: TaskId) -> DispatchResult<Task> {
        let task = self
            .inner
            .repository
            .find_by_id(task_id)
            .await?
            .ok_or(DispatchError::TaskNotFound(task_id))?;
        if task.is_terminal() {
            return Err(DispatchError::TaskTerminal(task_id));
        }
        Ok(task)
    }

    async fn start_step(
        &self,
        task: &mut Task,
        worker: &dyn Worker,
        assignment: &Assignment,
        index: usize,
    ) -> DispatchResult<()> {
        let offset = self.inner.logs.len(LogLocation::for_task(task)).await?;
        let step_request = assignment.step_request(index);
        if let Some(request) = &step_request {
            worker.start_step(request).await?;
        }
        let status = task.start_step(index, offset, &*self.inner.clock)?;
        if let Err(err) = self.inner.repository.update_task(task).await {
            if step_request.is_some() && matches!(err, TaskRepositoryError::AlreadyTerminal(_)) {
                self.abort_and_flush(worker, task.id(), index).await;
            }
            return Err(err.into());
        }
        debug!(task_id = %task.id(), step = index, offset, status = %status, "step started");
        Ok(())
    }

    async fn drive(
        self,
        mut task: Task,
        worker: Arc<dyn Worker>,
        assignment: Assignment,
        cancel: CancellationToken,
        exit_sender: watch::Sender<Option<TaskExit>>,
    ) {
        let task_id = task.id();
        let mut index = 0;
        let mut superseded = false;
        loop {
            let Some(step) = task.steps().get(index) else {
                break;
            };
            let flow = if step.name.runs_on_worker() {
                self.await_worker_step(&mut task, &*worker, index, &cancel)
                    .await
            } else {
                self.await_review(&mut task, &cancel).await
            };
            let advanced = match flow {
                Ok(StepFlow::Stop) => break,
                Ok(StepFlow::Continue) => {
                    index += 1;
                    self.start_step(&mut task, &*worker, &assignment, index)
                        .await
                }
                Err(err) => Err(err),
            };
            if let Err(err) = advanced {
                if err.is_superseded() {
                    superseded = true;
                } else {
                    self.fail(&mut task, err.to_string());
                }
                break;
            }
        }

        let exit = if superseded {
            warn!(task_id = %task_id, "task finished elsewhere; driver stopped");
            self.stored_exit(task_id).await
        } else {
            self.record_exit(&mut task).await
        };
        if let Some(exit) = &exit {
            info!(task_id = %task_id, outcome = exit.outcome.as_str(), "task finished");
        }
        self.controls().remove(&task_id);
        self.inner.gate.forget(task_id);
        exit_sender.send_replace(exit);
    }

    async fn record_exit(&self, task: &mut Task) -> Option<TaskExit> {
        let task_id = task.id();
        if !task.is_terminal() {
            self.fail(task, "flow ended before a terminal state".to_owned());
        }
        match self.complete_with_retry(task).await {
            Ok(()) => TaskExit::from_task(task),
            Err(TaskRepositoryError::AlreadyTerminal(_)) => {
                warn!(task_id = %task_id, "task finished elsewhere; keeping stored state");
                self.stored_exit(task_id).await
            }
            Err(err) => {
                error!(task_id = %task_id, error = %err, "failed to persist terminal task");
                let exit = TaskExit::from_task(task);
                if let Some(unrecorded) = &exit {
                    self.unrecorded().insert(task_id, unrecorded.clone());
                }
                exit
            }
        }
    }

    async fn complete_with_retry(&self, task: &Task) -> Result<(), TaskRepositoryError> {
        let mut delay = self.inner.settings.retry_backoff;
        let mut attempt = 1;
        loop {
            match self.inner.repository.complete_task(task).await {
                Ok(()) => return Ok(()),
                Err(err @ TaskRepositoryError::Persistence(_))
                    if attempt < self.inner.settings.persist_attempts =>
                {
                    warn!(
                        task_id = %task.id(),
                        attempt,
                        error = %err,
                        "terminal write failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn stored_exit(&self, task_id: TaskId) -> Option<TaskExit> {
        match self.inner.repository.find_by_id(task_id).await {
            Ok(stored) => stored.as_ref().and_then(TaskExit::from_task),
            Err(err) => {
                error!(task_id = %task_id, error = %err, "failed to reload finished task");
                None
            }
        }
    }

    fn fail(&self, task: &mut Task, message: String) {
        error!(task_id = %task.id(), error = %message, "task execution failed");
        if let Err(terminate_err) =
            task.terminate(TaskStatus::Failed, Some(message), &*self.inner.clock)
        {
            error!(task_id = %task.id(), error = %terminate_err, "failed to terminate task");
        }
    }

    async fn await_worker_step(
        &self,
        task: &mut Task,
        worker: &dyn Worker,
        index: usize,
        cancel: &CancellationToken,
    ) -> DispatchResult<StepFlow> {
        let task_id = task.id();
        let timeout = task.step_timeout();
        let waited = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = tokio::time::timeout(timeout, worker.wait_step(task_id, index)) => Some(result),
        };
        let clock = &*self.inner.clock;
        match waited {
            None => {
                self.abort_and_flush(worker, task_id, index).await;
                task.cancel(clock)?;
                warn!(task_id = %task_id, step = index, "task cancelled");
                Ok(StepFlow::Stop)
            }
            Some(Err(_elapsed)) => {
                self.abort_and_flush(worker, task_id, index).await;
                task.finish_step(
                    index,
                    StepStatus::Timeout,
                    Some(format!("step exceeded {}s timeout", timeout.as_secs())),
                    clock,
                )?;
                warn!(task_id = %task_id, step = index, "step timed out");
                Ok(StepFlow::Stop)
            }
            Some(Ok(Err(err))) => Err(err.into()),
            Some(Ok(Ok(exit))) => {
                task.finish_step(index, exit.status.step_status(), exit.message, clock)?;
                debug!(task_id = %task_id, step = index, exit_code = ?exit.exit_code, "step exited");
                if exit.status != StepExitStatus::Complete || task.is_terminal() {
                    return Ok(StepFlow::Stop);
                }
                self.inner.repository.update_task(task).await?;
                Ok(StepFlow::Continue)
            }
        }
    }

    async fn abort_and_flush(&self, worker: &dyn Worker, task_id: TaskId, index: usize) {
        if let Err(err) = worker.abort(task_id).await {
            warn!(task_id = %task_id, error = %err, "abort request failed");
            return;
        }
        match tokio::time::timeout(self.inner.settings.abort_grace, worker.wait_step(task_id, index))
            .await
        {
            Ok(Ok(_)) => debug!(task_id = %task_id, step = index, "worker confirmed abort"),
            Ok(Err(err)) => warn!(task_id = %task_id, error = %err, "abort confirmation failed"),
            Err(_) => warn!(task_id = %task_id, step = index, "worker did not confirm abort"),
        }
    }

    async fn await_review(
        &self,
        task: &mut Task,
        cancel: &CancellationToken,
    ) -> DispatchResult<StepFlow> {
        let task_id = task.id();
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                task.cancel(&*self.inner.clock)?;
                warn!(task_id = %task_id, "task cancelled during review");
                Ok(StepFlow::Stop)
            }
            () = self.inner.gate.wait(task_id) => {
                *task = self
                    .inner
                    .repository
                    .find_by_id(task_id)
                    .await?
                    .ok_or(DispatchError::TaskNotFound(task_id))?;
                info!(task_id = %task_id, "review approved; resuming");
                if task.is_terminal() {
                    Ok(StepFlow::Stop)
                } else {
                    Ok(StepFlow::Continue)
                }
            }
        }
    }

    /// Resumes a task whose review step was approved.
    pub fn release_review(&self, task_id: TaskId) {
        self.inner.gate.release(task_id);
    }

    /// Requests cooperative cancellation of a dispatched task.
    ///
    /// Returns `false` when this dispatcher is not driving the task.
    /// Repeated calls are no-ops.
    pub fn cancel(&self, task_id: TaskId) -> bool {
        self.controls().get(&task_id).is_some_and(|control| {
            control.cancel.cancel();
            true
        })
    }

    /// Returns whether this dispatcher is driving `task_id`.
    #[must_use]
    pub fn is_dispatched(&self, task_id: TaskId) -> bool {
        self.controls().contains_key(&task_id)
    }

    /// Waits until the task is terminal or `cancel` fires.
    ///
    /// Tasks driven by this dispatcher resolve from its exit signal; any
    /// other task is polled from the repository. A task whose terminal
    /// state could not be persisted resolves from the exit its driver
    /// observed.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::WaitCancelled`] when `cancel` fires first
    /// and [`DispatchError::TaskNotFound`] for an unknown task.
    pub async fn wait(&self, task_id: TaskId, cancel: &CancellationToken) -> DispatchResult<TaskExit> {
        let local = self
            .controls()
            .get(&task_id)
            .map(|control| control.exit.clone());
        if let Some(mut exit) = local {
            let signalled = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(DispatchError::WaitCancelled(task_id)),
                signalled = async {
                    exit.wait_for(Option::is_some)
                        .await
                        .ok()
                        .and_then(|value| value.clone())
                } => signalled,
            };
            if let Some(task_exit) = signalled {
                return Ok(task_exit);
            }
        }

        loop {
            if let Some(task_exit) = self.unrecorded().get(&task_id).cloned() {
                return Ok(task_exit);
            }
            let task = self
                .inner
                .repository
                .find_by_id(task_id)
                .await?
                .ok_or(DispatchError::TaskNotFound(task_id))?;
            if let Some(task_exit) = TaskExit::from_task(&task) {
                return Ok(task_exit);
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(DispatchError::WaitCancelled(task_id)),
                () = tokio::time::sleep(self.inner.settings.poll_interval) => {}
            }
        }
    }

    /// Fetches the scan report produced by `task` from its worker.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NoRunner`] when the task was never assigned
    /// and worker errors when the fetch fails.
    pub async fn scan_output(&self, task: &Task) -> DispatchResult<Option<String>> {
        let runner_id = task
            .runner_id()
            .ok_or(DispatchError::NoRunner(task.id()))?;
        let worker = self
            .inner
            .workers
            .worker(runner_id)
            .ok_or_else(|| DispatchError::UnknownRunner(runner_id.clone()))?;
        Ok(worker.scan_output(task.template_id(), task.id()).await?)
    }
}

#[async_trait]
impl<C> TaskExitSource for RunnerDispatcher<C>
where
    C: Clock + Send + Sync + 'static,
{
    async fn wait_exit(
        &self,
        task_id: TaskId,
        cancel: CancellationToken,
    ) -> Result<TaskExit, ExitWaitError> {
        self.wait(task_id, &cancel).await.map_err(|err| match err {
            DispatchError::WaitCancelled(id) => ExitWaitError::Cancelled(id),
            DispatchError::TaskNotFound(id) => ExitWaitError::NotFound(id),
            other => ExitWaitError::Unavailable(other.to_string()),
        })
    }
}
