//! Provider selection for version-control lookups.

mod registry;

pub use registry::VcsRegistry;
