//! Provider tags and query types for version-control lookups.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Hosting provider of a template repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VcsProvider {
    /// GitLab.
    Gitlab,
    /// Gitea.
    Gitea,
    /// GitHub.
    Github,
    /// Gitee.
    Gitee,
    /// Repository reachable by the worker without a hosting API.
    Local,
}

/// Error returned while parsing a provider tag.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown vcs provider: {0}")]
pub struct ParseVcsProviderError(pub String);

impl VcsProvider {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gitlab => "gitlab",
            Self::Gitea => "gitea",
            Self::Github => "github",
            Self::Gitee => "gitee",
            Self::Local => "local",
        }
    }

    /// Every supported provider.
    pub const ALL: [Self; 5] = [
        Self::Gitlab,
        Self::Gitea,
        Self::Github,
        Self::Gitee,
        Self::Local,
    ];
}

impl TryFrom<&str> for VcsProvider {
    type Error = ParseVcsProviderError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gitlab" => Ok(Self::Gitlab),
            "gitea" => Ok(Self::Gitea),
            "github" => Ok(Self::Github),
            "gitee" => Ok(Self::Gitee),
            "local" => Ok(Self::Local),
            _ => Err(ParseVcsProviderError(value.to_owned())),
        }
    }
}

impl fmt::Display for VcsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for every version-control lookup.
///
/// One structure serves all operations; each reads only the fields it
/// needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VcsQuery {
    /// Repository id or `namespace/name` path.
    pub id_or_path: String,
    /// Namespace filter for repository listings.
    pub namespace: Option<String>,
    /// Free-text filter for listings.
    pub search: Option<String>,
    /// Branch, tag or revision.
    pub reference: Option<String>,
    /// File path inside the repository.
    pub path: Option<String>,
    /// Maximum entries returned by listings.
    pub limit: Option<usize>,
    /// Entries skipped by listings.
    pub offset: usize,
}

impl VcsQuery {
    /// Creates a query addressing one repository.
    #[must_use]
    pub fn repository(id_or_path: impl Into<String>) -> Self {
        Self {
            id_or_path: id_or_path.into(),
            ..Self::default()
        }
    }

    /// Sets the branch, tag or revision.
    #[must_use]
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Sets the file path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the namespace filter.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Sets the free-text filter.
    #[must_use]
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Sets the page window.
    #[must_use]
    pub const fn with_page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }
}

/// Repository visible to the provider account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    /// `namespace/name` path.
    pub path: String,
    /// Default branch.
    pub default_branch: String,
    /// Clone address.
    pub clone_url: String,
}

/// Branch and the revision it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfo {
    /// Branch name.
    pub name: String,
    /// Revision at the branch head.
    pub revision: String,
}
