//! Runner dispatch services.

mod dispatcher;
mod gate;
mod registry;

pub use dispatcher::{DispatchError, DispatchResult, DispatcherSettings, RunnerDispatcher};
pub use gate::ApprovalGate;
pub use registry::WorkerRegistry;
