//! In-memory repository host for tests and local runs.

use crate::vcs::{
    domain::{BranchInfo, RepositoryInfo, VcsQuery},
    ports::{VcsError, VcsResult, VersionControl},
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// Thread-safe in-memory repository host.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVcs {
    state: Arc<RwLock<HashMap<String, HostedRepository>>>,
}

#[derive(Debug, Clone)]
struct HostedRepository {
    info: RepositoryInfo,
    branches: BTreeMap<String, String>,
    files: HashMap<(String, String), Vec<u8>>,
}

impl InMemoryVcs {
    /// Creates an empty host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a repository whose default branch points at `revision`.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError::Transport`] when the state lock is poisoned.
    pub fn add_repository(
        &self,
        path: &str,
        default_branch: &str,
        revision: &str,
    ) -> VcsResult<()> {
        let mut state = self.write()?;
        let mut branches = BTreeMap::new();
        branches.insert(default_branch.to_owned(), revision.to_owned());
        state.insert(
            path.to_owned(),
            HostedRepository {
                info: RepositoryInfo {
                    path: path.to_owned(),
                    default_branch: default_branch.to_owned(),
                    clone_url: format!("https://git.local/{path}.git"),
                },
                branches,
                files: HashMap::new(),
            },
        );
        Ok(())
    }

    /// Points `branch` at `revision`.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError::RepositoryNotFound`] for an unknown repository.
    pub fn set_branch(&self, path: &str, branch: &str, revision: &str) -> VcsResult<()> {
        let mut state = self.write()?;
        let repository = state
            .get_mut(path)
            .ok_or_else(|| VcsError::RepositoryNotFound(path.to_owned()))?;
        repository
            .branches
            .insert(branch.to_owned(), revision.to_owned());
        Ok(())
    }

    /// Stores file content at a revision.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError::RepositoryNotFound`] for an unknown repository.
    pub fn put_file(
        &self,
        path: &str,
        revision: &str,
        file: &str,
        content: impl Into<Vec<u8>>,
    ) -> VcsResult<()> {
        let mut state = self.write()?;
        let repository = state
            .get_mut(path)
            .ok_or_else(|| VcsError::RepositoryNotFound(path.to_owned()))?;
        repository
            .files
            .insert((revision.to_owned(), file.to_owned()), content.into());
        Ok(())
    }

    fn write(
        &self,
    ) -> VcsResult<std::sync::RwLockWriteGuard<'_, HashMap<String, HostedRepository>>> {
        self.state
            .write()
            .map_err(|err| VcsError::transport(std::io::Error::other(err.to_string())))
    }

    fn repository(&self, query: &VcsQuery) -> VcsResult<HostedRepository> {
        let state = self
            .state
            .read()
            .map_err(|err| VcsError::transport(std::io::Error::other(err.to_string())))?;
        state
            .get(&query.id_or_path)
            .cloned()
            .ok_or_else(|| VcsError::RepositoryNotFound(query.id_or_path.clone()))
    }
}

impl HostedRepository {
    fn resolve(&self, reference: Option<&str>) -> VcsResult<String> {
        let wanted = reference.unwrap_or(&self.info.default_branch);
        if let Some(revision) = self.branches.get(wanted) {
            return Ok(revision.clone());
        }
        if self.branches.values().any(|revision| revision == wanted) {
            return Ok(wanted.to_owned());
        }
        Err(VcsError::ReferenceNotFound {
            repository: self.info.path.clone(),
            reference: wanted.to_owned(),
        })
    }
}

fn page<T>(items: impl Iterator<Item = T>, query: &VcsQuery) -> Vec<T> {
    let skipped = items.skip(query.offset);
    match query.limit {
        Some(limit) => skipped.take(limit).collect(),
        None => skipped.collect(),
    }
}

#[async_trait]
impl VersionControl for InMemoryVcs {
    async fn list_repositories(&self, query: &VcsQuery) -> VcsResult<Vec<RepositoryInfo>> {
        let state = self
            .state
            .read()
            .map_err(|err| VcsError::transport(std::io::Error::other(err.to_string())))?;
        let mut matching: Vec<RepositoryInfo> = state
            .values()
            .map(|repository| repository.info.clone())
            .filter(|info| {
                query
                    .namespace
                    .as_deref()
                    .is_none_or(|namespace| info.path.starts_with(&format!("{namespace}/")))
            })
            .filter(|info| {
                query
                    .search
                    .as_deref()
                    .is_none_or(|search| info.path.contains(search))
            })
            .collect();
        matching.sort_by(|left, right| left.path.cmp(&right.path));
        Ok(page(matching.into_iter(), query))
    }

    async fn list_branches(&self, query: &VcsQuery) -> VcsResult<Vec<BranchInfo>> {
        let repository = self.repository(query)?;
        let branches = repository
            .branches
            .into_iter()
            .filter(|(name, _)| {
                query
                    .search
                    .as_deref()
                    .is_none_or(|search| name.contains(search))
            })
            .map(|(name, revision)| BranchInfo { name, revision });
        Ok(page(branches, query))
    }

    async fn resolve_revision(&self, query: &VcsQuery) -> VcsResult<String> {
        self.repository(query)?.resolve(query.reference.as_deref())
    }

    async fn read_file(&self, query: &VcsQuery) -> VcsResult<Vec<u8>> {
        let path = query.path.as_deref().ok_or(VcsError::MissingField("path"))?;
        let repository = self.repository(query)?;
        let revision = repository.resolve(query.reference.as_deref())?;
        repository
            .files
            .get(&(revision, path.to_owned()))
            .cloned()
            .ok_or_else(|| VcsError::FileNotFound {
                repository: query.id_or_path.clone(),
                path: path.to_owned(),
            })
    }
}
