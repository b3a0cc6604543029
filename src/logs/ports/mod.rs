//! Port contracts consumed by follow sessions.

pub mod exit;
pub mod sink;

pub use exit::{ExitWaitError, TaskExitSource};
pub use sink::{LogSink, SinkError};

#[cfg(test)]
pub use exit::MockTaskExitSource;
