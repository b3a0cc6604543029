//! Filesystem store for task log artifacts.
//!
//! All paths are resolved beneath one capability-scoped root directory, so
//! artifact keys can never address files outside it.

use crate::logs::domain::LogLocation;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::{Dir, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by the log store.
#[derive(Debug, Error)]
pub enum LogError {
    /// The log root could not be opened.
    #[error("failed to open log root {path}: {source}")]
    Root {
        /// Configured root.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// An artifact operation failed.
    #[error("log artifact {location}: {source}")]
    Artifact {
        /// Artifact address.
        location: LogLocation,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// A blocking filesystem task did not complete.
    #[error("log store task failed: {0}")]
    Background(#[from] tokio::task::JoinError),
}

impl LogError {
    /// Returns whether the artifact does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Artifact { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Append-only log artifact store rooted at one directory.
#[derive(Debug, Clone)]
pub struct LogStore {
    root: Arc<Dir>,
}

impl LogStore {
    /// Opens the store, creating the root directory when missing.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Root`] when the directory cannot be created or
    /// opened.
    pub fn open(base_dir: &Utf8Path) -> Result<Self, LogError> {
        let root_error = |source| LogError::Root {
            path: base_dir.to_owned(),
            source,
        };
        Dir::create_ambient_dir_all(base_dir, ambient_authority()).map_err(root_error)?;
        let root = Dir::open_ambient_dir(base_dir, ambient_authority()).map_err(root_error)?;
        Ok(Self {
            root: Arc::new(root),
        })
    }

    async fn run_blocking<F, T>(&self, location: LogLocation, f: F) -> Result<T, LogError>
    where
        F: FnOnce(&Dir) -> io::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let root = Arc::clone(&self.root);
        tokio::task::spawn_blocking(move || f(&root))
            .await?
            .map_err(|source| LogError::Artifact { location, source })
    }

    /// Creates an empty artifact if none exists yet.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Artifact`] when the file cannot be created.
    pub async fn ensure(&self, location: LogLocation) -> Result<(), LogError> {
        self.run_blocking(location, move |root| {
            root.create_dir_all(location.directory())?;
            root.open_with(
                location.relative_path(),
                OpenOptions::new().create(true).append(true),
            )?;
            Ok(())
        })
        .await
    }

    /// Appends `bytes` to the artifact, creating it when missing.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Artifact`] when the write fails.
    pub async fn append(&self, location: LogLocation, bytes: &[u8]) -> Result<(), LogError> {
        let bytes = bytes.to_vec();
        self.run_blocking(location, move |root| {
            root.create_dir_all(location.directory())?;
            let mut file = root.open_with(
                location.relative_path(),
                OpenOptions::new().create(true).append(true),
            )?;
            file.write_all(&bytes)?;
            file.flush()
        })
        .await
    }

    /// Returns the current artifact length; a missing artifact is empty.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Artifact`] for failures other than a missing
    /// file.
    pub async fn len(&self, location: LogLocation) -> Result<u64, LogError> {
        self.run_blocking(location, move |root| {
            match root.metadata(location.relative_path()) {
                Ok(metadata) => Ok(metadata.len()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(0),
                Err(err) => Err(err),
            }
        })
        .await
    }

    /// Reads the artifact from `offset` to its current end.
    ///
    /// An offset at or past the end yields an empty buffer.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Artifact`] when the artifact is missing or
    /// unreadable.
    pub async fn read_from(&self, location: LogLocation, offset: u64) -> Result<Vec<u8>, LogError> {
        self.run_blocking(location, move |root| {
            let mut file = root.open(location.relative_path())?.into_std();
            let mut content = Vec::new();
            if offset < file.metadata()?.len() {
                file.seek(SeekFrom::Start(offset))?;
                file.read_to_end(&mut content)?;
            }
            Ok(content)
        })
        .await
    }

    /// Opens the artifact for asynchronous reading positioned at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Artifact`] when the artifact is missing or the
    /// seek fails.
    pub async fn open_at(
        &self,
        location: LogLocation,
        offset: u64,
    ) -> Result<tokio::fs::File, LogError> {
        let file = self
            .run_blocking(location, move |root| {
                let mut file = root.open(location.relative_path())?.into_std();
                file.seek(SeekFrom::Start(offset))?;
                Ok(file)
            })
            .await?;
        Ok(tokio::fs::File::from_std(file))
    }
}
