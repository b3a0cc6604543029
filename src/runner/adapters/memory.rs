//! In-process worker for local runs and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

use crate::logs::{adapters::LogStore, domain::LogLocation};
use crate::runner::domain::{StepExit, StepRequest};
use crate::runner::ports::{Worker, WorkerError, WorkerResult};
use crate::task::domain::{StepName, TaskId, TemplateId};

/// Scripted behaviour of one step kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepBehaviour {
    /// Writes the lines and exits successfully.
    Succeed(Vec<String>),
    /// Writes the lines and exits with a failure.
    Fail {
        /// Output lines.
        lines: Vec<String>,
        /// Script exit code.
        exit_code: i32,
        /// Failure message.
        message: String,
    },
    /// Writes the lines and runs until aborted.
    Hang(Vec<String>),
    /// Refuses to start, as an unreachable worker would.
    Refuse,
}

type ExitSender = Arc<watch::Sender<Option<StepExit>>>;

#[derive(Debug, Default)]
struct WorkerState {
    behaviours: HashMap<StepName, StepBehaviour>,
    exits: HashMap<(TaskId, usize), ExitSender>,
    running: HashMap<TaskId, (LogLocation, usize)>,
    started: Vec<(TaskId, StepName)>,
    aborted: Vec<TaskId>,
    scan_output: Option<String>,
}

/// Worker executing scripted behaviours instead of step scripts.
///
/// Step output goes to the same log store the control plane reads, so
/// follow sessions observe it exactly as they would a remote worker's.
#[derive(Debug, Clone)]
pub struct InMemoryWorker {
    store: LogStore,
    state: Arc<Mutex<WorkerState>>,
}

impl InMemoryWorker {
    /// Creates a worker whose steps succeed with one line of output.
    #[must_use]
    pub fn new(store: LogStore) -> Self {
        Self {
            store,
            state: Arc::new(Mutex::new(WorkerState::default())),
        }
    }

    fn lock(&self) -> WorkerResult<MutexGuard<'_, WorkerState>> {
        self.state
            .lock()
            .map_err(|err| WorkerError::unreachable(std::io::Error::other(err.to_string())))
    }

    /// Scripts the behaviour of every step named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError`] when the state lock is poisoned.
    pub fn set_behaviour(&self, name: StepName, behaviour: StepBehaviour) -> WorkerResult<()> {
        self.lock()?.behaviours.insert(name, behaviour);
        Ok(())
    }

    /// Sets the report returned for scan tasks.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError`] when the state lock is poisoned.
    pub fn set_scan_output(&self, output: impl Into<String>) -> WorkerResult<()> {
        self.lock()?.scan_output = Some(output.into());
        Ok(())
    }

    /// Returns the steps started for `task_id`, in start order.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError`] when the state lock is poisoned.
    pub fn started_steps(&self, task_id: TaskId) -> WorkerResult<Vec<StepName>> {
        Ok(self
            .lock()?
            .started
            .iter()
            .filter(|(id, _)| *id == task_id)
            .map(|(_, name)| *name)
            .collect())
    }

    /// Returns how many abort requests `task_id` received.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError`] when the state lock is poisoned.
    pub fn abort_count(&self, task_id: TaskId) -> WorkerResult<usize> {
        Ok(self
            .lock()?
            .aborted
            .iter()
            .filter(|id| **id == task_id)
            .count())
    }

    async fn write_lines(&self, location: LogLocation, lines: &[String]) -> WorkerResult<()> {
        let mut output = String::new();
        for line in lines {
            output.push_str(line);
            output.push('\n');
        }
        self.store
            .append(location, output.as_bytes())
            .await
            .map_err(WorkerError::unreachable)
    }
}

#[async_trait]
impl Worker for InMemoryWorker {
    async fn start_step(&self, request: &StepRequest) -> WorkerResult<()> {
        let name = request.step.name;
        let behaviour = self
            .lock()?
            .behaviours
            .get(&name)
            .cloned()
            .unwrap_or_else(|| StepBehaviour::Succeed(vec![format!("{name}: ok")]));
        let location = LogLocation::new(request.template_id, request.task_id);
        let (lines, exit) = match behaviour {
            StepBehaviour::Refuse => {
                return Err(WorkerError::unreachable(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "worker refused connection",
                )));
            }
            StepBehaviour::Succeed(lines) => (lines, Some(StepExit::complete())),
            StepBehaviour::Fail {
                lines,
                exit_code,
                message,
            } => (lines, Some(StepExit::failed(Some(exit_code), message))),
            StepBehaviour::Hang(lines) => (lines, None),
        };
        {
            let mut state = self.lock()?;
            state.started.push((request.task_id, name));
            state
                .running
                .insert(request.task_id, (location, request.step.index));
            state.exits.insert(
                (request.task_id, request.step.index),
                Arc::new(watch::channel(None).0),
            );
        }
        self.write_lines(location, &lines).await?;
        if let Some(exit) = exit
            && let Some(sender) = self
                .lock()?
                .exits
                .get(&(request.task_id, request.step.index))
        {
            sender.send_replace(Some(exit));
        }
        Ok(())
    }

    async fn wait_step(&self, task_id: TaskId, index: usize) -> WorkerResult<StepExit> {
        let mut receiver = self
            .lock()?
            .exits
            .get(&(task_id, index))
            .map(|sender| sender.subscribe())
            .ok_or_else(|| {
                WorkerError::InvalidResponse(format!("step {index} of task {task_id} never started"))
            })?;
        let exit = receiver
            .wait_for(Option::is_some)
            .await
            .map_err(|err| WorkerError::InvalidResponse(err.to_string()))?;
        exit.clone()
            .ok_or_else(|| WorkerError::InvalidResponse("empty step exit".to_owned()))
    }

    async fn abort(&self, task_id: TaskId) -> WorkerResult<()> {
        let target = {
            let mut state = self.lock()?;
            state.aborted.push(task_id);
            state.running.get(&task_id).copied().and_then(|(location, index)| {
                state
                    .exits
                    .get(&(task_id, index))
                    .filter(|sender| sender.borrow().is_none())
                    .map(|sender| (location, Arc::clone(sender)))
            })
        };
        if let Some((location, sender)) = target {
            self.write_lines(location, &["aborted".to_owned()]).await?;
            sender.send_replace(Some(StepExit::cancelled()));
        }
        Ok(())
    }

    async fn scan_output(
        &self,
        _template_id: TemplateId,
        _task_id: TaskId,
    ) -> WorkerResult<Option<String>> {
        Ok(self.lock()?.scan_output.clone())
    }
}
