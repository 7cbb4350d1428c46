//! Core engine of slumberd
//!
//! Ties together:
//! - The policy check engine (ordered, first-hit-wins per tick)
//! - The standby controller (single owner of the OS sleep inhibition)
//! - The wake scheduler (hardware wake timers from configured schedules)
//! - The remote shutdown listener (UDP magic packets)
//! - Plugin policy evaluation

pub mod actions;
pub mod checks;
pub mod engine;
pub mod remote;
pub mod standby;
pub mod wake;

pub use engine::*;
pub use standby::*;
pub use wake::WakeScheduler;
