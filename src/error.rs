//! Error classification shared by every service boundary.

use serde::Serialize;
use std::fmt;

/// Coarse classification of a failure, independent of where it occurred.
///
/// Every service-level error maps onto exactly one kind before it leaves
/// the service so callers can decide on retry and presentation without
/// matching on component-specific variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or missing request input.
    Validation,
    /// Request conflicts with current environment or template state.
    Conflict,
    /// Referenced record does not exist.
    NotFound,
    /// Caller lacks permission for the mutation.
    Forbidden,
    /// Transaction or storage failure.
    Persistence,
    /// Persisted state contradicts reported data.
    DataInconsistency,
    /// Worker or client transport failure.
    Transport,
    /// Step execution failure reported by a worker.
    Execution,
}

impl ErrorKind {
    /// Returns the canonical machine-readable code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::Persistence => "persistence",
            Self::DataInconsistency => "data_inconsistency",
            Self::Transport => "transport",
            Self::Execution => "execution",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
