//! Host capabilities model

use serde::{Deserialize, Serialize};

/// Which sleep-inhibition mechanism a host backend provides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InhibitBackend {
    /// Request/clear handle with a human-readable reason attached,
    /// visible to the OS.
    PowerRequest,
    /// A global flag with no attached reason; reasons are only logged
    /// locally.
    GlobalFlag,
}

/// Describes what a probed power host can do
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostCapabilities {
    /// Which inhibition mechanism was selected at startup
    pub inhibit_backend: InhibitBackend,

    /// Can arm hardware wake timers
    pub wake_timers: bool,

    /// Can hibernate (suspend-to-disk configured)
    pub can_hibernate: bool,
}

impl HostCapabilities {
    /// The richer backend: reason-bearing power requests.
    pub fn preferred() -> Self {
        Self {
            inhibit_backend: InhibitBackend::PowerRequest,
            wake_timers: true,
            can_hibernate: true,
        }
    }

    /// The fallback backend for hosts without power requests.
    pub fn fallback() -> Self {
        Self {
            inhibit_backend: InhibitBackend::GlobalFlag,
            wake_timers: false,
            can_hibernate: false,
        }
    }

    /// Whether the OS will display the inhibition reason
    pub fn supports_reason(&self) -> bool {
        self.inhibit_backend == InhibitBackend::PowerRequest
    }
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self::fallback()
    }
}
