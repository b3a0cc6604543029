//! Request-level composition of the control plane.
//!
//! [`ControlPlane`] ties task creation, dispatch, log following and scan
//! reconciliation into the operations exposed over HTTP. Scan tasks are
//! seeded before dispatch and finalized by a supervisor once the
//! dispatcher reports the task terminal.

mod error;
mod plane;

pub use error::{OrchestratorError, OrchestratorResult};
pub use plane::{ControlPlane, ControlPlaneParts, ControlPlaneSettings};

