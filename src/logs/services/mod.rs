//! Log reading and follow session services.

mod cursor;
mod follower;

pub use cursor::{CursorEvent, LogCursor, MAX_CHUNK_BYTES};
pub use follower::LogFollower;
