//! Control plane operations.

use super::{OrchestratorError, OrchestratorResult};
use crate::config::ControlPlaneConfig;
use crate::error::ErrorKind;
use crate::logs::{
    adapters::LogStore,
    domain::{FollowEnd, LogLocation},
    ports::LogSink,
    services::LogFollower,
};
use crate::runner::{
    ports::RunnerSelector,
    services::{DispatcherSettings, RunnerDispatcher, WorkerRegistry},
};
use crate::scan::{
    domain::PolicyResult,
    ports::{PolicyCatalog, PolicyResultRepository},
    services::{ScanReconcileError, ScanResultReconciler},
};
use crate::task::{
    domain::{Task, TaskId, TaskStatus, TaskType, UserId},
    ports::{AccessControl, TaskCreation, TaskRepository},
    services::{CreateScanRequest, CreateTaskRequest, TaskLifecycleService},
};
use crate::vcs::VcsRegistry;
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Adapters the control plane is assembled from.
pub struct ControlPlaneParts<C> {
    /// Task, environment and template persistence.
    pub tasks: Arc<dyn TaskRepository>,
    /// Policy lookup.
    pub catalog: Arc<dyn PolicyCatalog>,
    /// Policy result persistence.
    pub results: Arc<dyn PolicyResultRepository>,
    /// Version-control providers.
    pub vcs: Arc<VcsRegistry>,
    /// Authorization collaborator.
    pub access: Arc<dyn AccessControl>,
    /// Registered workers.
    pub workers: WorkerRegistry,
    /// Pool selection for tasks without an explicit runner.
    pub selector: Arc<dyn RunnerSelector>,
    /// Log artifact store shared with local workers.
    pub logs: LogStore,
    /// Time source.
    pub clock: Arc<C>,
}

/// Tunables of the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlPlaneSettings {
    /// Step timeout applied when neither request nor template sets one.
    pub default_step_timeout_secs: u64,
    /// Delay before a follow session re-reads an exhausted artifact.
    pub follow_backoff: Duration,
    /// Dispatcher timing.
    pub dispatcher: DispatcherSettings,
    /// Attempts at reconciling a finished scan after persistence failures.
    pub reconcile_attempts: u32,
    /// Delay before the first reconcile retry; doubled on each further one.
    pub reconcile_backoff: Duration,
}

impl ControlPlaneSettings {
    /// Derives settings from process configuration.
    #[must_use]
    pub fn from_config(config: &ControlPlaneConfig) -> Self {
        Self {
            default_step_timeout_secs: config.tasks.default_step_timeout_secs,
            follow_backoff: config.logs.follow_backoff(),
            dispatcher: DispatcherSettings {
                poll_interval: config.logs.follow_backoff(),
                persist_attempts: config.tasks.persist_attempts,
                retry_backoff: config.tasks.retry_backoff(),
                ..DispatcherSettings::default()
            },
            reconcile_attempts: config.tasks.persist_attempts,
            reconcile_backoff: config.tasks.retry_backoff(),
        }
    }
}

/// Request-level operations of the control plane.
pub struct ControlPlane<C>
where
    C: Clock + Send + Sync + 'static,
{
    lifecycle: TaskLifecycleService<dyn TaskRepository, C>,
    dispatcher: RunnerDispatcher<C>,
    reconciler: ScanResultReconciler<C>,
    follower: LogFollower,
    logs: LogStore,
    shutdown: CancellationToken,
    reconcile_attempts: u32,
    reconcile_backoff: Duration,
}

impl<C> Clone for ControlPlane<C>
where
    C: Clock + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            lifecycle: self.lifecycle.clone(),
            dispatcher: self.dispatcher.clone(),
            reconciler: self.reconciler.clone(),
            follower: self.follower.clone(),
            logs: self.logs.clone(),
            shutdown: self.shutdown.clone(),
            reconcile_attempts: self.reconcile_attempts,
            reconcile_backoff: self.reconcile_backoff,
        }
    }
}

impl<C> ControlPlane<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Assembles the control plane.
    #[must_use]
    pub fn new(parts: ControlPlaneParts<C>, settings: ControlPlaneSettings) -> Self {
        let shutdown = CancellationToken::new();
        let dispatcher = RunnerDispatcher::new(
            Arc::clone(&parts.tasks),
            parts.workers,
            parts.selector,
            parts.logs.clone(),
            Arc::clone(&parts.clock),
            settings.dispatcher,
        );
        let follower = LogFollower::new(
            parts.logs.clone(),
            Arc::new(dispatcher.clone()),
            settings.follow_backoff,
            shutdown.clone(),
        );
        let lifecycle = TaskLifecycleService::new(
            parts.tasks,
            parts.vcs,
            parts.access,
            Arc::clone(&parts.clock),
            settings.default_step_timeout_secs,
        );
        let reconciler = ScanResultReconciler::new(parts.catalog, parts.results, parts.clock);
        Self {
            lifecycle,
            dispatcher,
            reconciler,
            follower,
            logs: parts.logs,
            shutdown,
            reconcile_attempts: settings.reconcile_attempts,
            reconcile_backoff: settings.reconcile_backoff,
        }
    }

    /// Creates an environment task and dispatches it, together with its
    /// mirror scan when the template requires one.
    ///
    /// A task that cannot be dispatched is terminated as failed and the
    /// dispatch error is returned. A mirror scan that cannot be dispatched
    /// only fails itself.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] classified by [`OrchestratorError::kind`].
    pub async fn submit_task(&self, request: CreateTaskRequest) -> OrchestratorResult<TaskCreation> {
        let creation = self.lifecycle.create_task(request).await?;
        if let Err(err) = self.launch(creation.task.clone()).await {
            if let Some(mirror) = &creation.mirror {
                self.abandon(mirror.id(), "deploy task was not dispatched".to_owned())
                    .await;
            }
            return Err(err);
        }
        let mirror = match creation.mirror {
            Some(mirror) => {
                if let Err(err) = self.launch(mirror.clone()).await {
                    warn!(task_id = %mirror.id(), error = %err, "mirror scan not dispatched");
                }
                Some(self.task(mirror.id()).await?)
            }
            None => None,
        };
        Ok(TaskCreation {
            task: self.task(creation.task.id()).await?,
            mirror,
        })
    }

    /// Creates a scan task and dispatches it.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] classified by [`OrchestratorError::kind`].
    pub async fn submit_scan(&self, request: CreateScanRequest) -> OrchestratorResult<Task> {
        let task = self.lifecycle.create_scan_task(request).await?;
        self.launch(task.clone()).await?;
        self.task(task.id()).await
    }

    async fn launch(&self, task: Task) -> OrchestratorResult<()> {
        let task_id = task.id();
        let is_scan = task.task_type() == TaskType::Scan;
        if is_scan && let Err(err) = self.reconciler.init_scan_result(&task).await {
            self.abandon(task_id, err.to_string()).await;
            return Err(err.into());
        }
        if let Err(err) = self.dispatcher.dispatch(task).await {
            if err.is_superseded() {
                info!(task_id = %task_id, "task finished before dispatch");
                if is_scan && let Ok(finished) = self.task(task_id).await {
                    self.finalize_scan(&finished, None).await;
                }
                return Ok(());
            }
            if let Some(failed) = self.abandon(task_id, err.to_string()).await
                && is_scan
            {
                self.finalize_scan(&failed, None).await;
            }
            return Err(err.into());
        }
        if is_scan {
            self.supervise_scan(task_id);
        }
        Ok(())
    }

    async fn abandon(&self, task_id: TaskId, message: String) -> Option<Task> {
        match self
            .lifecycle
            .terminate(task_id, TaskStatus::Failed, Some(message))
            .await
        {
            Ok(task) => Some(task),
            Err(err) => {
                error!(task_id = %task_id, error = %err, "failed to terminate undispatched task");
                None
            }
        }
    }

    fn supervise_scan(&self, task_id: TaskId) {
        let plane = self.clone();
        tokio::spawn(async move {
            if let Err(err) = plane.dispatcher.wait(task_id, &plane.shutdown).await {
                warn!(task_id = %task_id, error = %err, "scan supervision stopped");
                return;
            }
            let task = match plane.lifecycle.find_task(task_id).await {
                Ok(Some(task)) => task,
                Ok(None) => {
                    error!(task_id = %task_id, "scan task vanished before reconciliation");
                    return;
                }
                Err(err) => {
                    error!(task_id = %task_id, error = %err, "failed to load finished scan task");
                    return;
                }
            };
            let output = if task.status() == TaskStatus::Complete {
                plane
                    .dispatcher
                    .scan_output(&task)
                    .await
                    .unwrap_or_else(|err| {
                        warn!(task_id = %task_id, error = %err, "scan output unavailable");
                        None
                    })
            } else {
                None
            };
            plane.finalize_scan(&task, output.as_deref()).await;
        });
    }

    /// Reconciles the results of a finished scan.
    ///
    /// Persistence failures are retried with doubling backoff until the
    /// attempts run out or the plane shuts down. An unreadable report is
    /// replaced by an empty one, so pending rows still end `failed`.
    async fn finalize_scan(&self, task: &Task, output: Option<&str>) {
        let task_id = task.id();
        let mut report = output;
        let mut delay = self.reconcile_backoff;
        let mut attempt = 1;
        loop {
            let Err(err) = self.reconciler.update_scan_result(task, report).await else {
                return;
            };
            match &err {
                ScanReconcileError::Report(_) if report.is_some() => {
                    warn!(
                        task_id = %task_id,
                        error = %err,
                        "scan report unreadable; finalizing pending results as failed"
                    );
                    report = None;
                }
                _ if err.kind() == ErrorKind::Persistence && attempt < self.reconcile_attempts => {
                    warn!(
                        task_id = %task_id,
                        attempt,
                        error = %err,
                        "scan reconciliation failed; retrying"
                    );
                    tokio::select! {
                        biased;
                        () = self.shutdown.cancelled() => {
                            warn!(task_id = %task_id, "shutdown before scan results were reconciled");
                            return;
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                _ => {
                    error!(
                        task_id = %task_id,
                        kind = err.kind().as_str(),
                        error = %err,
                        "scan reconciliation failed"
                    );
                    return;
                }
            }
        }
    }

    /// Approves the review step of a task and resumes its execution.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] classified by [`OrchestratorError::kind`].
    pub async fn approve(&self, task_id: TaskId, approver: UserId) -> OrchestratorResult<Task> {
        let task = self.lifecycle.approve(task_id, approver).await?;
        self.dispatcher.release_review(task_id);
        Ok(task)
    }

    /// Cancels a task.
    ///
    /// A task driven by this process is cancelled cooperatively and ends
    /// asynchronously; any other non-terminal task is terminated directly.
    /// Cancelling a terminal task returns it unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] classified by [`OrchestratorError::kind`].
    pub async fn cancel(&self, task_id: TaskId, user: UserId) -> OrchestratorResult<Task> {
        let task = self.lifecycle.authorize_cancel(task_id, user).await?;
        if task.is_terminal() {
            return Ok(task);
        }
        if self.dispatcher.cancel(task_id) {
            info!(task_id = %task_id, user = %user, "cancellation requested");
            return Ok(task);
        }
        let cancelled = self
            .lifecycle
            .terminate(task_id, TaskStatus::Cancelled, None)
            .await?;
        if self.dispatcher.cancel(task_id) {
            info!(task_id = %task_id, "stopping a dispatch that raced the cancellation");
        }
        if cancelled.task_type() == TaskType::Scan {
            self.finalize_scan(&cancelled, None).await;
        }
        Ok(cancelled)
    }

    /// Returns a task with its step statuses and log offsets.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::TaskNotFound`] for an unknown task.
    pub async fn task(&self, task_id: TaskId) -> OrchestratorResult<Task> {
        self.lifecycle
            .find_task(task_id)
            .await?
            .ok_or(OrchestratorError::TaskNotFound(task_id))
    }

    /// Returns a task's log from `offset` to its current end.
    ///
    /// A task whose artifact does not exist yet has an empty log.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::TaskNotFound`] for an unknown task and
    /// [`OrchestratorError::Logs`] when the artifact cannot be read.
    pub async fn read_log(&self, task_id: TaskId, offset: u64) -> OrchestratorResult<Vec<u8>> {
        let task = self.task(task_id).await?;
        match self.logs.read_from(LogLocation::for_task(&task), offset).await {
            Ok(content) => Ok(content),
            Err(err) if err.is_not_found() => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    /// Lists the policy results of a task.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::TaskNotFound`] for an unknown task.
    pub async fn policy_results(&self, task_id: TaskId) -> OrchestratorResult<Vec<PolicyResult>> {
        self.task(task_id).await?;
        Ok(self.reconciler.results_for(task_id).await?)
    }

    /// Runs a follow session over `task`'s log from `offset`.
    pub async fn follow(
        &self,
        task: &Task,
        offset: u64,
        sink: &mut dyn LogSink,
        peer_closed: CancellationToken,
    ) -> FollowEnd {
        self.follower
            .follow(LogLocation::for_task(task), offset, sink, peer_closed)
            .await
    }

    /// Ends open follow sessions and stops waiting on running tasks.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
