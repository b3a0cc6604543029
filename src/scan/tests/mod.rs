//! Unit tests for scan result reconciliation.

mod fixtures;
