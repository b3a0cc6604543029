//! Provider-keyed registry of version-control backends.

use crate::vcs::{
    domain::{VcsProvider, VcsQuery},
    ports::{VcsError, VcsResult, VersionControl},
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Maps each provider tag to its backend.
#[derive(Clone, Default)]
pub struct VcsRegistry {
    backends: HashMap<VcsProvider, Arc<dyn VersionControl>>,
}

impl VcsRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `backend` for `provider`, replacing any previous one.
    #[must_use]
    pub fn with_backend(mut self, provider: VcsProvider, backend: Arc<dyn VersionControl>) -> Self {
        self.backends.insert(provider, backend);
        self
    }

    /// Returns the backend for `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError::ProviderUnavailable`] when none is registered.
    pub fn backend(&self, provider: VcsProvider) -> VcsResult<Arc<dyn VersionControl>> {
        self.backends
            .get(&provider)
            .cloned()
            .ok_or(VcsError::ProviderUnavailable(provider))
    }

    /// Resolves `reference` in `repository` at `provider`.
    ///
    /// # Errors
    ///
    /// Propagates backend lookup and resolution errors.
    pub async fn resolve_revision(
        &self,
        provider: VcsProvider,
        repository: &str,
        reference: &str,
    ) -> VcsResult<String> {
        let backend = self.backend(provider)?;
        let query = VcsQuery::repository(repository).with_reference(reference);
        let revision = backend.resolve_revision(&query).await?;
        debug!(%provider, repository, reference, %revision, "resolved source revision");
        Ok(revision)
    }
}

impl std::fmt::Debug for VcsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VcsRegistry")
            .field("providers", &self.backends.keys().collect::<Vec<_>>())
            .finish()
    }
}
