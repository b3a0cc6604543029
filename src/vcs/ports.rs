//! Capability-set port implemented once per hosting provider.

use super::domain::{BranchInfo, RepositoryInfo, VcsProvider, VcsQuery};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for version-control operations.
pub type VcsResult<T> = Result<T, VcsError>;

/// Read-only repository accessor.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Lists repositories matching `query.namespace` and `query.search`.
    async fn list_repositories(&self, query: &VcsQuery) -> VcsResult<Vec<RepositoryInfo>>;

    /// Lists branches of `query.id_or_path`.
    async fn list_branches(&self, query: &VcsQuery) -> VcsResult<Vec<BranchInfo>>;

    /// Resolves `query.reference` to a concrete revision.
    async fn resolve_revision(&self, query: &VcsQuery) -> VcsResult<String>;

    /// Reads `query.path` at `query.reference`.
    async fn read_file(&self, query: &VcsQuery) -> VcsResult<Vec<u8>>;
}

/// Errors returned by version-control implementations.
#[derive(Debug, Clone, Error)]
pub enum VcsError {
    /// No implementation is registered for the provider.
    #[error("no version control backend for provider {0}")]
    ProviderUnavailable(VcsProvider),

    /// The repository does not exist or is not visible.
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    /// The branch, tag or revision does not exist.
    #[error("reference '{reference}' not found in {repository}")]
    ReferenceNotFound {
        /// Repository searched.
        repository: String,
        /// Missing reference.
        reference: String,
    },

    /// The file does not exist at the requested reference.
    #[error("file '{path}' not found in {repository}")]
    FileNotFound {
        /// Repository searched.
        repository: String,
        /// Missing path.
        path: String,
    },

    /// The query lacks a field the operation needs.
    #[error("query is missing {0}")]
    MissingField(&'static str),

    /// The provider API could not be reached.
    #[error("vcs transport error: {0}")]
    Transport(Arc<dyn std::error::Error + Send + Sync>),
}

impl VcsError {
    /// Wraps a transport error.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Arc::new(err))
    }
}
