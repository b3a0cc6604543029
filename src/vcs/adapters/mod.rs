//! Version-control backends.

pub mod memory;
pub mod passthrough;

pub use memory::InMemoryVcs;
pub use passthrough::PassthroughVcs;
