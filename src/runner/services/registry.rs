//! Runner-keyed registry of workers.

use crate::runner::ports::Worker;
use crate::task::domain::RunnerId;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps each runner identifier to its worker.
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    workers: HashMap<RunnerId, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `worker` under `runner_id`, replacing any previous one.
    #[must_use]
    pub fn with_worker(mut self, runner_id: RunnerId, worker: Arc<dyn Worker>) -> Self {
        self.workers.insert(runner_id, worker);
        self
    }

    /// Returns the worker registered under `runner_id`.
    #[must_use]
    pub fn worker(&self, runner_id: &RunnerId) -> Option<Arc<dyn Worker>> {
        self.workers.get(runner_id).cloned()
    }
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("runners", &self.workers.keys().collect::<Vec<_>>())
            .finish()
    }
}
