//! Adapter implementations of the runner ports.

pub mod http;
pub mod memory;
pub mod selector;

pub use http::HttpWorkerClient;
pub use memory::{InMemoryWorker, StepBehaviour};
pub use selector::StaticRunnerSelector;
