//! Policies and the targets they apply to.

use crate::task::domain::{EnvironmentId, Task, TemplateId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Identifier of a compliance policy; matches the scan tool's `rule_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyId(String);

impl PolicyId {
    /// Creates a policy identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the identifier as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compliance policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Policy identifier.
    pub id: PolicyId,
    /// Policy group the policy belongs to.
    pub group_id: String,
    /// Display name.
    pub name: String,
}

/// What a scan evaluates policies against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanTarget {
    /// Policies bound to an environment.
    Environment(EnvironmentId),
    /// Policies bound to a template.
    Template(TemplateId),
}

impl ScanTarget {
    /// Returns the environment of the task when it has one, otherwise its
    /// template.
    #[must_use]
    pub fn for_task(task: &Task) -> Self {
        task.environment_id()
            .map_or(Self::Template(task.template_id()), Self::Environment)
    }

    /// Returns the storage tag of the target kind.
    #[must_use]
    pub const fn kind(self) -> &'static str {
        match self {
            Self::Environment(_) => "environment",
            Self::Template(_) => "template",
        }
    }

    /// Returns the target identifier.
    #[must_use]
    pub const fn id(self) -> uuid::Uuid {
        match self {
            Self::Environment(id) => id.into_inner(),
            Self::Template(id) => id.into_inner(),
        }
    }
}

/// Verdict of one policy for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyResultStatus {
    /// Seeded, not yet reconciled.
    Pending,
    /// The tool reported the policy as passed.
    Passed,
    /// The tool reported a violation.
    Violated,
    /// The policy is suppressed for the target.
    Suppressed,
    /// The tool did not report on the policy.
    Failed,
}

/// Error returned while parsing a persisted result status.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown policy result status: {0}")]
pub struct ParsePolicyResultStatusError(pub String);

impl PolicyResultStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Passed => "passed",
            Self::Violated => "violated",
            Self::Suppressed => "suppressed",
            Self::Failed => "failed",
        }
    }
}

impl TryFrom<&str> for PolicyResultStatus {
    type Error = ParsePolicyResultStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "passed" => Ok(Self::Passed),
            "violated" => Ok(Self::Violated),
            "suppressed" => Ok(Self::Suppressed),
            "failed" => Ok(Self::Failed),
            _ => Err(ParsePolicyResultStatusError(value.to_owned())),
        }
    }
}

impl fmt::Display for PolicyResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
