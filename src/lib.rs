//! Caisson: Infrastructure-as-Code execution control plane.
//!
//! This crate orchestrates plan, apply, destroy and compliance-scan
//! executions against remote workers. It tracks each execution as an
//! ordered flow of steps, streams live execution logs to connected clients
//! and reconciles policy-compliance scan output into persisted verdicts.
//!
//! # Architecture
//!
//! Caisson follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (database, workers, etc.)
//!
//! # Modules
//!
//! - [`task`]: Task creation, step flow and environment locking
//! - [`runner`]: Dispatching tasks to remote execution workers
//! - [`logs`]: Log artifacts and live log-follow sessions
//! - [`scan`]: Policy-compliance scan result reconciliation
//! - [`vcs`]: Read-only version-control collaborator
//! - [`orchestrator`]: Request-level composition of the components above
//! - [`api`]: HTTP surface

pub mod api;
pub mod config;
pub mod error;
pub mod logs;
pub mod orchestrator;
pub mod runner;
pub mod scan;
pub mod task;
pub mod telemetry;
pub mod vcs;
