//! Task lifecycle management.
//!
//! Creates tasks against environment and template state, builds the step
//! flow, and keeps the one-active-task-per-environment lock consistent with
//! the task rows that hold it. The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
