//! In-memory adapters for scan reconciliation tests and local runs.

mod catalog;
mod results;

pub use catalog::InMemoryPolicyCatalog;
pub use results::InMemoryPolicyResultRepository;
