//! Dispatch of committed tasks to remote execution workers.
//!
//! The dispatcher renders a workspace assignment, drives the task's steps
//! in flow order on the selected worker, bounds each step by the task's
//! step timeout, holds review steps until approval and supports
//! cooperative cancellation.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
