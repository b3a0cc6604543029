//! Scan tool output and the row updates derived from it.

use super::PolicyId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Violation detail reported by the scan tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Violation {
    /// Rule name.
    pub rule_name: String,
    /// Rule description.
    pub description: String,
    /// Rule identifier, equal to the policy id.
    pub rule_id: String,
    /// Severity label.
    pub severity: String,
    /// Category label.
    pub category: String,
    /// Free-form comment.
    pub comment: String,
    /// Offending resource name.
    pub resource_name: String,
    /// Offending resource type.
    pub resource_type: String,
    /// Module containing the resource.
    pub module_name: String,
    /// File containing the resource.
    pub file: String,
    /// Plan root directory.
    pub plan_root: String,
    /// Line of the resource in `file`.
    pub line: u32,
    /// Source snippet.
    pub source: String,
}

/// Rule the scan tool reported as passed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassedRule {
    /// Rule name.
    pub rule_name: String,
    /// Rule description.
    pub description: String,
    /// Rule identifier, equal to the policy id.
    pub rule_id: String,
    /// Severity label.
    pub severity: String,
    /// Category label.
    pub category: String,
}

/// Result section of the scan tool document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanResults {
    /// Reported violations, in report order.
    pub violations: Vec<Violation>,
    /// Reported passes, in report order.
    pub passed_rules: Vec<PassedRule>,
}

/// Scan tool output document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanReport {
    /// Reported results.
    pub results: ScanResults,
}

/// Error returned when the scan output is not a valid report.
#[derive(Debug, Error)]
#[error("invalid scan report: {0}")]
pub struct ScanReportError(#[from] serde_json::Error);

/// Verdict carried by one update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultOutcome {
    /// Violated, with detail.
    Violated(Box<Violation>),
    /// Passed.
    Passed,
}

/// Update for one pre-seeded result row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultUpdate {
    /// Policy whose row is updated.
    pub policy_id: PolicyId,
    /// New verdict.
    pub outcome: ResultOutcome,
}

impl ScanReport {
    /// Parses the scan tool JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ScanReportError`] when the document is not valid JSON or
    /// does not match the report shape.
    pub fn parse(raw: &str) -> Result<Self, ScanReportError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Returns row updates in application order: violations first, then
    /// passes, each in report order.
    ///
    /// Several updates may target the same policy; the last one applied
    /// wins.
    #[must_use]
    pub fn updates(&self) -> Vec<ResultUpdate> {
        let violated = self.results.violations.iter().map(|violation| ResultUpdate {
            policy_id: PolicyId::new(violation.rule_id.clone()),
            outcome: ResultOutcome::Violated(Box::new(violation.clone())),
        });
        let passed = self.results.passed_rules.iter().map(|rule| ResultUpdate {
            policy_id: PolicyId::new(rule.rule_id.clone()),
            outcome: ResultOutcome::Passed,
        });
        violated.chain(passed).collect()
    }
}
