//! Task log artifacts and live follow sessions.
//!
//! Each task writes one append-only artifact at
//! `<base>/<template>/<task>/output.log`. Clients read it from an offset or
//! follow it live until the task ends, they disconnect, or the server shuts
//! down.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
