//! Authorization collaborator evaluated before any task mutation.

use crate::task::domain::{EnvironmentId, TaskId, TemplateId, UserId};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Mutation a caller asks to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Create a plan or apply task.
    Deploy,
    /// Create a destroy task.
    Destroy,
    /// Create a scan task.
    Scan,
    /// Approve a review step.
    Approve,
    /// Cancel a task.
    Cancel,
}

impl Action {
    /// Returns the action name used in logs and errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deploy => "deploy",
            Self::Destroy => "destroy",
            Self::Scan => "scan",
            Self::Approve => "approve",
            Self::Cancel => "cancel",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Object an action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// An environment.
    Environment(EnvironmentId),
    /// A template.
    Template(TemplateId),
    /// An existing task.
    Task(TaskId),
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Environment(id) => write!(f, "environment {id}"),
            Self::Template(id) => write!(f, "template {id}"),
            Self::Task(id) => write!(f, "task {id}"),
        }
    }
}

/// Errors returned by authorization checks.
#[derive(Debug, Clone, Error)]
pub enum AccessError {
    /// The caller may not perform the action.
    #[error("user {user} may not {action} {resource}")]
    Denied {
        /// Caller.
        user: UserId,
        /// Requested action.
        action: Action,
        /// Targeted resource.
        resource: Resource,
    },

    /// The authorization backend failed.
    #[error("authorization backend error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl AccessError {
    /// Wraps a backend error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}

/// Permission check contract.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccessControl: Send + Sync {
    /// Succeeds when `user` may perform `action` on `resource`.
    async fn authorize(
        &self,
        user: UserId,
        action: Action,
        resource: Resource,
    ) -> Result<(), AccessError>;
}
