//! Unit tests for the runner module.

mod fixtures;
