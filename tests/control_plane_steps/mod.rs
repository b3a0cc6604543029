//! Step definitions for control plane behaviour tests.

pub mod given;
pub mod then;
pub mod when;
pub mod world;
