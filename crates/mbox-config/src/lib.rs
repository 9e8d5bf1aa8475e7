//! Configuration for mbox
//!
//! Global configuration lives at `~/.config/mbox/config.toml` and covers
//! instance defaults (port range, image, data root) and the container
//! runtime connection.

mod error;
mod global;

pub use error::*;
pub use global::*;
