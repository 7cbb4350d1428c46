//! RTC wakealarm handling

use chrono::{DateTime, Local};
use slumber_host_api::{HostError, HostResult};
use std::path::PathBuf;
use tracing::debug;

pub(crate) const WAKEALARM_PATH: &str = "/sys/class/rtc/rtc0/wakealarm";

/// One hardware wake timer via the RTC sysfs interface.
///
/// The kernel rejects writing a new alarm while one is set, so arming always
/// clears first. Epoch seconds, local clock converted by the kernel.
pub struct RtcWakeTimer {
    path: PathBuf,
}

impl RtcWakeTimer {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn arm(&self, at: DateTime<Local>) -> HostResult<()> {
        self.clear()?;
        let epoch = at.timestamp();
        std::fs::write(&self.path, format!("{}\n", epoch))
            .map_err(|e| HostError::WakeTimerFailed(e.to_string()))?;
        debug!(at = %at, epoch = epoch, "Armed RTC wake timer");
        Ok(())
    }

    pub fn disarm(&self) -> HostResult<()> {
        self.clear()
    }

    fn clear(&self) -> HostResult<()> {
        std::fs::write(&self.path, "0\n").map_err(|e| HostError::WakeTimerFailed(e.to_string()))
    }
}

impl Default for RtcWakeTimer {
    fn default() -> Self {
        Self::new(PathBuf::from(WAKEALARM_PATH))
    }
}
