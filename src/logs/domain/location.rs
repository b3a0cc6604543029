//! Stable addressing of task log artifacts.

use crate::task::domain::{Task, TaskId, TemplateId};
use camino::Utf8PathBuf;
use std::fmt;

/// File name of every task log artifact.
pub const LOG_FILE_NAME: &str = "output.log";

/// Address of one task's log artifact, keyed by template and task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogLocation {
    template_id: TemplateId,
    task_id: TaskId,
}

impl LogLocation {
    /// Creates a location from its keys.
    #[must_use]
    pub const fn new(template_id: TemplateId, task_id: TaskId) -> Self {
        Self {
            template_id,
            task_id,
        }
    }

    /// Returns the location of `task`'s artifact.
    #[must_use]
    pub const fn for_task(task: &Task) -> Self {
        Self::new(task.template_id(), task.id())
    }

    /// Returns the template key.
    #[must_use]
    pub const fn template_id(self) -> TemplateId {
        self.template_id
    }

    /// Returns the task key.
    #[must_use]
    pub const fn task_id(self) -> TaskId {
        self.task_id
    }

    /// Returns the directory holding the artifact, relative to the log root.
    #[must_use]
    pub fn directory(self) -> Utf8PathBuf {
        Utf8PathBuf::from(self.template_id.to_string()).join(self.task_id.to_string())
    }

    /// Returns the artifact path relative to the log root.
    #[must_use]
    pub fn relative_path(self) -> Utf8PathBuf {
        self.directory().join(LOG_FILE_NAME)
    }
}

impl fmt::Display for LogLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.relative_path())
    }
}
