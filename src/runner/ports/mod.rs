//! Port contracts for workers and runner selection.

pub mod selector;
pub mod worker;

pub use selector::RunnerSelector;
pub use worker::{Worker, WorkerError, WorkerResult};

#[cfg(test)]
pub use selector::MockRunnerSelector;
#[cfg(test)]
pub use worker::MockWorker;
