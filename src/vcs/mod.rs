//! Read-only version-control collaborator.
//!
//! Task creation resolves the template's branch or tag to a concrete
//! revision through this boundary so that a committed task always executes
//! the same source. Each hosting provider is one implementation of
//! [`ports::VersionControl`], selected through [`services::VcsRegistry`].

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

pub use domain::{BranchInfo, ParseVcsProviderError, RepositoryInfo, VcsProvider, VcsQuery};
pub use ports::{VcsError, VcsResult, VersionControl};
pub use services::VcsRegistry;
