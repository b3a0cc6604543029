//! Adapter implementations for log storage and client transports.

pub mod store;
pub mod websocket;

pub use store::{LogError, LogStore};
