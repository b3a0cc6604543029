//! Domain model for policies, results and scan reports.

mod policy;
mod report;
mod result;

pub use policy::{ParsePolicyResultStatusError, Policy, PolicyId, PolicyResultStatus, ScanTarget};
pub use report::{PassedRule, ResultOutcome, ResultUpdate, ScanReport, ScanReportError, Violation};
pub use result::{PolicyResult, PolicyResultId, ReconcileSummary};
