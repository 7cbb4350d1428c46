//! Platform abstraction for slumberd
//!
//! All OS power control goes through the [`PowerHost`] trait: sleep
//! inhibition, wake timers and power state transitions. One implementation
//! per platform backend, plus a mock for tests.

mod capabilities;
mod mock;
mod traits;

pub use capabilities::*;
pub use mock::*;
pub use traits::*;
