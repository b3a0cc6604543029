//! In-memory policy catalog.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::scan::{
    domain::{Policy, PolicyId, ScanTarget},
    ports::{PolicyCatalog, PolicyCatalogError},
};

/// Policy catalog backed by in-process maps.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPolicyCatalog {
    state: Arc<RwLock<CatalogState>>,
}

#[derive(Debug, Default)]
struct CatalogState {
    policies: BTreeMap<PolicyId, Policy>,
    bindings: HashMap<ScanTarget, HashSet<PolicyId>>,
    suppressions: HashMap<ScanTarget, HashSet<PolicyId>>,
}

fn poisoned(err: impl std::fmt::Display) -> PolicyCatalogError {
    PolicyCatalogError::persistence(std::io::Error::other(err.to_string()))
}

impl InMemoryPolicyCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `policy` and binds it to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyCatalogError::Persistence`] when the lock is poisoned.
    pub fn bind(&self, target: ScanTarget, policy: Policy) -> Result<(), PolicyCatalogError> {
        let mut state = self.state.write().map_err(poisoned)?;
        state
            .bindings
            .entry(target)
            .or_default()
            .insert(policy.id.clone());
        state.policies.insert(policy.id.clone(), policy);
        Ok(())
    }

    /// Suppresses `policy_id` for `target`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyCatalogError::Persistence`] when the lock is poisoned.
    pub fn suppress(
        &self,
        target: ScanTarget,
        policy_id: PolicyId,
    ) -> Result<(), PolicyCatalogError> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.suppressions.entry(target).or_default().insert(policy_id);
        Ok(())
    }
}

#[async_trait]
impl PolicyCatalog for InMemoryPolicyCatalog {
    async fn policies_for(&self, target: ScanTarget) -> Result<Vec<Policy>, PolicyCatalogError> {
        let state = self.state.read().map_err(poisoned)?;
        let Some(bound) = state.bindings.get(&target) else {
            return Ok(Vec::new());
        };
        Ok(state
            .policies
            .values()
            .filter(|policy| bound.contains(&policy.id))
            .cloned()
            .collect())
    }

    async fn suppressed_for(
        &self,
        target: ScanTarget,
    ) -> Result<HashSet<PolicyId>, PolicyCatalogError> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.suppressions.get(&target).cloned().unwrap_or_default())
    }
}
