//! In-memory policy result repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::scan::{
    domain::{PolicyResult, ReconcileSummary, ResultUpdate},
    ports::{PolicyResultError, PolicyResultRepository, PolicyResultResult},
};
use crate::task::domain::TaskId;

/// Thread-safe in-memory result repository.
///
/// Reconciliation works on a copy of the task's rows and swaps it in only
/// when every update applied.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPolicyResultRepository {
    rows: Arc<RwLock<HashMap<TaskId, Vec<PolicyResult>>>>,
}

impl InMemoryPolicyResultRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> PolicyResultResult<RwLockReadGuard<'_, HashMap<TaskId, Vec<PolicyResult>>>> {
        self.rows
            .read()
            .map_err(|err| PolicyResultError::persistence(std::io::Error::other(err.to_string())))
    }

    fn write(
        &self,
    ) -> PolicyResultResult<RwLockWriteGuard<'_, HashMap<TaskId, Vec<PolicyResult>>>> {
        self.rows
            .write()
            .map_err(|err| PolicyResultError::persistence(std::io::Error::other(err.to_string())))
    }
}

#[async_trait]
impl PolicyResultRepository for InMemoryPolicyResultRepository {
    async fn seed(&self, task_id: TaskId, rows: &[PolicyResult]) -> PolicyResultResult<()> {
        let mut state = self.write()?;
        if state.contains_key(&task_id) {
            return Err(PolicyResultError::AlreadySeeded(task_id));
        }
        let mut seeded = rows.to_vec();
        seeded.sort_by(|left, right| left.policy_id.cmp(&right.policy_id));
        state.insert(task_id, seeded);
        Ok(())
    }

    async fn reconcile(
        &self,
        task_id: TaskId,
        updates: &[ResultUpdate],
        now: DateTime<Utc>,
    ) -> PolicyResultResult<ReconcileSummary> {
        let mut state = self.write()?;
        let mut working = state.get(&task_id).cloned().unwrap_or_default();
        for update in updates {
            let row = working
                .iter_mut()
                .find(|row| row.policy_id == update.policy_id)
                .ok_or_else(|| PolicyResultError::MissingResult {
                    task_id,
                    policy_id: update.policy_id.clone(),
                })?;
            row.apply(&update.outcome, now);
        }
        for row in &mut working {
            row.finalize(now);
        }
        let summary = ReconcileSummary::of(&working);
        if !working.is_empty() {
            state.insert(task_id, working);
        }
        Ok(summary)
    }

    async fn find_by_task(&self, task_id: TaskId) -> PolicyResultResult<Vec<PolicyResult>> {
        Ok(self.read()?.get(&task_id).cloned().unwrap_or_default())
    }
}
