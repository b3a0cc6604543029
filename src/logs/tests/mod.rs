//! Unit tests for the logs module.

mod support;
