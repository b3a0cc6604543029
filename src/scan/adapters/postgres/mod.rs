//! `PostgreSQL` adapters for policy catalog and scan results.

mod models;
mod repository;
mod schema;

pub use repository::{PostgresPolicyCatalog, PostgresPolicyResultRepository};
