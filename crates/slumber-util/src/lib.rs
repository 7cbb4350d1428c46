//! Shared utilities for slumberd
//!
//! Strongly-typed identifiers, wake/uptime schedule descriptors with their
//! recurrence math, and small formatting helpers.

mod fmt;
mod ids;
mod schedule;

pub use fmt::*;
pub use ids::*;
pub use schedule::*;
