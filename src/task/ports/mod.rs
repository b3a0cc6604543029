//! Port contracts for task lifecycle management.
//!
//! Ports define infrastructure-agnostic interfaces used by task services.

pub mod access;
pub mod repository;

pub use access::{AccessControl, AccessError, Action, Resource};
pub use repository::{TaskCreation, TaskRepository, TaskRepositoryError, TaskRepositoryResult};

#[cfg(test)]
pub use access::MockAccessControl;
