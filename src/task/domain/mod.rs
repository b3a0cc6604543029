//! Domain model for IaC task execution.
//!
//! Tasks, their ordered steps, the environments they lock and the templates
//! they execute. Infrastructure concerns stay outside this boundary.

mod environment;
mod error;
mod ids;
mod status;
mod step;
mod task;
mod template;

pub use environment::{Environment, PersistedEnvironmentData};
pub use error::{ParseStatusError, ParseTaskTypeError, TaskDomainError};
pub use ids::{EnvironmentId, RunnerId, TaskId, TemplateId, UserId};
pub use status::{StepStatus, TaskStatus, TaskType};
pub use step::{Step, StepName, build_flow};
pub use task::{ExecutionSnapshot, NewTaskParams, PersistedTaskData, Task};
pub use template::{
    PersistedTemplateData, Template, TemplateDefaults, TemplateSource, TemplateStatus,
};
