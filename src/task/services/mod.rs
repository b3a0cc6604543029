//! Application services for task lifecycle orchestration.

mod lifecycle;

pub use lifecycle::{
    CreateScanRequest, CreateTaskRequest, TaskLifecycleError, TaskLifecycleResult,
    TaskLifecycleService, TaskOptions,
};
