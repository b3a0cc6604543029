//! Log artifact addressing and follow session outcomes.

mod close;
mod location;

pub use close::{CloseFrame, FollowEnd};
pub use location::{LOG_FILE_NAME, LogLocation};
