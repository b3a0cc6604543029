//! Lookup of the policies bound to a scan target.

use crate::scan::domain::{Policy, PolicyId, ScanTarget};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// Read access to policy bindings and suppressions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PolicyCatalog: Send + Sync {
    /// Returns the policies bound to `target`, ordered by policy id.
    async fn policies_for(&self, target: ScanTarget) -> Result<Vec<Policy>, PolicyCatalogError>;

    /// Returns the policies suppressed for `target`.
    async fn suppressed_for(
        &self,
        target: ScanTarget,
    ) -> Result<HashSet<PolicyId>, PolicyCatalogError>;
}

/// Errors returned by policy catalog implementations.
#[derive(Debug, Clone, Error)]
pub enum PolicyCatalogError {
    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl PolicyCatalogError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
