//! Port contracts for policy lookup and result persistence.

pub mod catalog;
pub mod results;

pub use catalog::{PolicyCatalog, PolicyCatalogError};
pub use results::{PolicyResultError, PolicyResultRepository, PolicyResultResult};

#[cfg(test)]
pub use catalog::MockPolicyCatalog;
