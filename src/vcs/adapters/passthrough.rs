//! Backend that trusts the reference as given.
//!
//! Used for providers with no API integration configured: the worker checks
//! the reference out itself, so resolution returns it unchanged.

use crate::vcs::{
    domain::{BranchInfo, RepositoryInfo, VcsProvider, VcsQuery},
    ports::{VcsError, VcsResult, VersionControl},
};
use async_trait::async_trait;

/// Version-control backend that performs no remote lookups.
#[derive(Debug, Clone, Copy)]
pub struct PassthroughVcs {
    provider: VcsProvider,
}

impl PassthroughVcs {
    /// Creates a passthrough backend for `provider`.
    #[must_use]
    pub const fn new(provider: VcsProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl VersionControl for PassthroughVcs {
    async fn list_repositories(&self, _query: &VcsQuery) -> VcsResult<Vec<RepositoryInfo>> {
        Ok(Vec::new())
    }

    async fn list_branches(&self, _query: &VcsQuery) -> VcsResult<Vec<BranchInfo>> {
        Ok(Vec::new())
    }

    async fn resolve_revision(&self, query: &VcsQuery) -> VcsResult<String> {
        query
            .reference
            .clone()
            .ok_or(VcsError::MissingField("reference"))
    }

    async fn read_file(&self, _query: &VcsQuery) -> VcsResult<Vec<u8>> {
        Err(VcsError::ProviderUnavailable(self.provider))
    }
}
