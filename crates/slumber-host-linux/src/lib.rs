//! Linux power host for slumberd
//!
//! Provides:
//! - Sleep inhibition via a held `systemd-inhibit` child (preferred) or the
//!   kernel wake-lock interface (fallback)
//! - Hardware wake timers via the RTC wakealarm
//! - Suspend/hibernate/restart/shutdown through systemctl

mod power;
mod wake;

pub use power::*;
pub use wake::*;

use slumber_host_api::{HostCapabilities, InhibitBackend};
use std::path::Path;
use tracing::{info, warn};

/// Probe the running system and pick the richest supported backend.
///
/// Called once at startup; the result is fixed for the process lifetime.
pub fn probe_capabilities() -> HostCapabilities {
    let inhibit_backend = if systemd_inhibit_available() {
        InhibitBackend::PowerRequest
    } else {
        if !Path::new(power::WAKE_LOCK_PATH).exists() {
            warn!("Neither systemd-inhibit nor kernel wake locks found; inhibitions will fail");
        }
        InhibitBackend::GlobalFlag
    };

    let wake_timers = Path::new(wake::WAKEALARM_PATH).exists();
    let can_hibernate = std::fs::read_to_string("/sys/power/state")
        .map(|s| s.split_whitespace().any(|w| w == "disk"))
        .unwrap_or(false);

    info!(
        backend = ?inhibit_backend,
        wake_timers,
        can_hibernate,
        "Probed power capabilities"
    );

    HostCapabilities {
        inhibit_backend,
        wake_timers,
        can_hibernate,
    }
}

fn systemd_inhibit_available() -> bool {
    std::process::Command::new("systemd-inhibit")
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
