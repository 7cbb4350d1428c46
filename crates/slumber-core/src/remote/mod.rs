//! Remote shutdown over UDP magic packets

mod listener;
mod packet;

pub use listener::*;
pub use packet::*;
