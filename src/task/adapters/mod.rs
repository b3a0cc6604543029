//! Adapter implementations for task ports.

pub mod access;
pub mod memory;
pub mod postgres;
