//! Adapter implementations of the scan ports.

pub mod memory;
pub mod postgres;
