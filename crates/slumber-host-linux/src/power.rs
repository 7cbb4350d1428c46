//! Linux power host implementation

use async_trait::async_trait;
use chrono::{DateTime, Local};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use slumber_api::PowerAction;
use slumber_host_api::{HostCapabilities, HostError, HostResult, InhibitBackend, PowerHost};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::wake::RtcWakeTimer;

pub(crate) const WAKE_LOCK_PATH: &str = "/sys/power/wake_lock";
pub(crate) const WAKE_UNLOCK_PATH: &str = "/sys/power/wake_unlock";

/// Name written to the kernel wake-lock interface
const LOCK_NAME: &str = "slumberd";

/// Linux power host
///
/// Keeps at most one inhibition alive. The preferred backend holds a
/// `systemd-inhibit ... sleep infinity` child for the lifetime of the
/// inhibition; releasing sends it SIGTERM. The fallback backend toggles a
/// kernel wake lock.
pub struct LinuxPowerHost {
    capabilities: HostCapabilities,
    inhibitor: Mutex<Option<Child>>,
    wake_timer: RtcWakeTimer,
    wake_lock_path: PathBuf,
    wake_unlock_path: PathBuf,
    /// Binary used for power actions; overridable in tests
    systemctl: String,
}

impl LinuxPowerHost {
    pub fn new(capabilities: HostCapabilities) -> Self {
        Self {
            capabilities,
            inhibitor: Mutex::new(None),
            wake_timer: RtcWakeTimer::default(),
            wake_lock_path: PathBuf::from(WAKE_LOCK_PATH),
            wake_unlock_path: PathBuf::from(WAKE_UNLOCK_PATH),
            systemctl: "systemctl".into(),
        }
    }

    /// Probe the system and build the host in one step
    pub fn probed() -> Self {
        Self::new(crate::probe_capabilities())
    }

    #[cfg(test)]
    fn with_paths(
        capabilities: HostCapabilities,
        wake_lock: PathBuf,
        wake_unlock: PathBuf,
        wakealarm: PathBuf,
        systemctl: &str,
    ) -> Self {
        Self {
            capabilities,
            inhibitor: Mutex::new(None),
            wake_timer: RtcWakeTimer::new(wakealarm),
            wake_lock_path: wake_lock,
            wake_unlock_path: wake_unlock,
            systemctl: systemctl.into(),
        }
    }

    fn spawn_inhibitor(&self, reason: Option<&str>) -> HostResult<()> {
        let why = reason.unwrap_or("slumberd policy active");
        let child = Command::new("systemd-inhibit")
            .arg("--what=sleep")
            .arg("--who=slumberd")
            .arg(format!("--why={}", why))
            .arg("--mode=block")
            .arg("sleep")
            .arg("infinity")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HostError::InhibitFailed(e.to_string()))?;

        debug!(pid = ?child.id(), why = why, "Holding systemd-inhibit");
        *self.inhibitor.lock().unwrap() = Some(child);
        Ok(())
    }

    async fn release_inhibitor(&self) -> HostResult<()> {
        let child = self.inhibitor.lock().unwrap().take();
        let Some(mut child) = child else {
            return Ok(());
        };

        if let Some(pid) = child.id() {
            // SIGTERM lets systemd drop the inhibitor lock cleanly
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!(pid = pid, error = %e, "SIGTERM to inhibitor failed, killing");
                child
                    .kill()
                    .await
                    .map_err(|e| HostError::ReleaseFailed(e.to_string()))?;
            }
        }
        child
            .wait()
            .await
            .map_err(|e| HostError::ReleaseFailed(e.to_string()))?;
        Ok(())
    }

    fn take_wake_lock(&self) -> HostResult<()> {
        std::fs::write(&self.wake_lock_path, LOCK_NAME)
            .map_err(|e| HostError::InhibitFailed(e.to_string()))
    }

    fn drop_wake_lock(&self) -> HostResult<()> {
        match std::fs::write(&self.wake_unlock_path, LOCK_NAME) {
            Ok(()) => Ok(()),
            // The kernel reports EINVAL when the named lock is not held
            Err(e) if e.raw_os_error() == Some(nix::libc::EINVAL) => Ok(()),
            Err(e) => Err(HostError::ReleaseFailed(e.to_string())),
        }
    }

    async fn run_action(&self, action: PowerAction, verb: &str) -> HostResult<()> {
        info!(action = %action, "Executing power action");
        let output = Command::new(&self.systemctl)
            .arg(verb)
            .output()
            .await
            .map_err(|e| HostError::ActionFailed {
                action,
                message: e.to_string(),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(HostError::ActionFailed {
                action,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl PowerHost for LinuxPowerHost {
    fn capabilities(&self) -> &HostCapabilities {
        &self.capabilities
    }

    async fn inhibit_sleep(&self, reason: Option<&str>) -> HostResult<()> {
        // Replace any existing inhibition so exactly one is ever held
        self.allow_sleep().await?;

        match self.capabilities.inhibit_backend {
            InhibitBackend::PowerRequest => self.spawn_inhibitor(reason),
            InhibitBackend::GlobalFlag => {
                if let Some(reason) = reason {
                    info!(reason = reason, "Sleep inhibited (flag backend)");
                }
                self.take_wake_lock()
            }
        }
    }

    async fn allow_sleep(&self) -> HostResult<()> {
        match self.capabilities.inhibit_backend {
            InhibitBackend::PowerRequest => self.release_inhibitor().await,
            InhibitBackend::GlobalFlag => self.drop_wake_lock(),
        }
    }

    fn query_wake_timers_allowed(&self) -> bool {
        self.capabilities.wake_timers
    }

    async fn create_wake_timer(&self, at: DateTime<Local>) -> HostResult<()> {
        if !self.capabilities.wake_timers {
            return Err(HostError::Unsupported);
        }
        self.wake_timer.arm(at)
    }

    async fn cancel_wake_timer(&self) -> HostResult<()> {
        if !self.capabilities.wake_timers {
            return Ok(());
        }
        self.wake_timer.disarm()
    }

    async fn suspend_now(&self) -> HostResult<()> {
        self.run_action(PowerAction::Standby, "suspend").await
    }

    async fn hibernate_now(&self) -> HostResult<()> {
        if !self.capabilities.can_hibernate {
            return Err(HostError::Unsupported);
        }
        self.run_action(PowerAction::Hibernate, "hibernate").await
    }

    async fn shutdown_now(&self) -> HostResult<()> {
        self.run_action(PowerAction::Shutdown, "poweroff").await
    }

    async fn restart_now(&self) -> HostResult<()> {
        self.run_action(PowerAction::Restart, "reboot").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use slumber_host_api::HostCapabilities;

    fn flag_host(dir: &tempfile::TempDir, systemctl: &str) -> LinuxPowerHost {
        let caps = HostCapabilities {
            inhibit_backend: InhibitBackend::GlobalFlag,
            wake_timers: true,
            can_hibernate: false,
        };
        let lock = dir.path().join("wake_lock");
        let unlock = dir.path().join("wake_unlock");
        let alarm = dir.path().join("wakealarm");
        std::fs::write(&lock, "").unwrap();
        std::fs::write(&unlock, "").unwrap();
        std::fs::write(&alarm, "").unwrap();
        LinuxPowerHost::with_paths(caps, lock, unlock, alarm, systemctl)
    }

    #[tokio::test]
    async fn flag_backend_writes_lock_files() {
        let dir = tempfile::tempdir().unwrap();
        let host = flag_host(&dir, "true");

        host.inhibit_sleep(Some("backup running")).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("wake_lock")).unwrap(),
            "slumberd"
        );

        host.allow_sleep().await.unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("wake_unlock")).unwrap(),
            "slumberd"
        );
    }

    #[tokio::test]
    async fn wake_timer_written_as_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let host = flag_host(&dir, "true");

        let at = Local.with_ymd_and_hms(2030, 1, 1, 3, 0, 0).unwrap();
        host.create_wake_timer(at).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("wakealarm")).unwrap();
        assert_eq!(written.trim(), at.timestamp().to_string());
    }

    #[tokio::test]
    async fn failed_action_maps_to_error() {
        let dir = tempfile::tempdir().unwrap();
        let host = flag_host(&dir, "false");

        let err = host.suspend_now().await.unwrap_err();
        assert!(matches!(err, HostError::ActionFailed { .. }));
    }

    #[tokio::test]
    async fn successful_action() {
        let dir = tempfile::tempdir().unwrap();
        let host = flag_host(&dir, "true");

        host.perform(PowerAction::Standby).await.unwrap();
    }
}
