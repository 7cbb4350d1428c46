//! Shared value types for slumberd
//!
//! Kept in a leaf crate so the config, plugin and core crates can agree on
//! verdicts and power actions without depending on each other.

mod action;
mod events;
mod verdict;

pub use action::*;
pub use events::*;
pub use verdict::*;
