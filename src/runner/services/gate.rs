//! Hand-off between review approvals and the step driver.

use crate::task::domain::TaskId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;

/// Per-task latch released when a review is approved.
///
/// A release that arrives before the driver starts waiting is kept, so
/// approval and waiting may happen in either order.
#[derive(Debug, Clone, Default)]
pub struct ApprovalGate {
    latches: Arc<Mutex<HashMap<TaskId, Arc<Notify>>>>,
}

impl ApprovalGate {
    /// Creates a gate with no pending approvals.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn latch(&self, task_id: TaskId) -> Arc<Notify> {
        let mut latches = self.latches.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(latches.entry(task_id).or_default())
    }

    /// Releases the driver waiting on `task_id`.
    pub fn release(&self, task_id: TaskId) {
        self.latch(task_id).notify_one();
    }

    /// Waits until `task_id` is released.
    pub async fn wait(&self, task_id: TaskId) {
        let latch = self.latch(task_id);
        latch.notified().await;
    }

    /// Drops the latch of a finished task.
    pub fn forget(&self, task_id: TaskId) {
        self.latches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&task_id);
    }
}
