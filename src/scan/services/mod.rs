//! Scan result services.

mod reconciler;

pub use reconciler::{ScanReconcileError, ScanReconcileResult, ScanResultReconciler};
