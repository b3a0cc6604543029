//! Policy-compliance scan result reconciliation.
//!
//! A scan task gets one `pending` result row per applicable policy when it
//! starts. When it ends, the scan tool report moves rows to `violated` or
//! `passed`, and every row the report did not mention becomes `failed`.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
