//! Power host trait

use async_trait::async_trait;
use chrono::{DateTime, Local};
use slumber_api::PowerAction;
use thiserror::Error;

use crate::HostCapabilities;

/// Errors from power host operations
///
/// All of these are fatal to the current call only; callers roll back to a
/// safe idle state and retry on the next occasion.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Failed to create sleep inhibition: {0}")]
    InhibitFailed(String),

    #[error("Failed to release sleep inhibition: {0}")]
    ReleaseFailed(String),

    #[error("Failed to arm wake timer: {0}")]
    WakeTimerFailed(String),

    #[error("Power action '{action}' failed: {message}")]
    ActionFailed {
        action: PowerAction,
        message: String,
    },

    #[error("Not supported by this host")]
    Unsupported,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type HostResult<T> = Result<T, HostError>;

/// The narrow seam between the agent and the operating system's power
/// facilities.
///
/// Implementations keep at most one inhibition and one wake timer alive;
/// creating a new one first tears down the existing one. Callers serialize
/// access (the standby controller holds the lock for inhibitions).
#[async_trait]
pub trait PowerHost: Send + Sync {
    /// Capabilities probed at startup
    fn capabilities(&self) -> &HostCapabilities;

    /// Inhibit sleep. The reason is attached to the OS request when the
    /// backend supports it; otherwise it is the caller's job to log it.
    async fn inhibit_sleep(&self, reason: Option<&str>) -> HostResult<()>;

    /// Release the current inhibition. A no-op if none is held.
    async fn allow_sleep(&self) -> HostResult<()>;

    /// Whether this host can arm wake timers at all
    fn query_wake_timers_allowed(&self) -> bool;

    /// Arm the hardware wake timer for the given absolute time, replacing
    /// any previously armed one.
    async fn create_wake_timer(&self, at: DateTime<Local>) -> HostResult<()>;

    /// Disarm the hardware wake timer, if armed.
    async fn cancel_wake_timer(&self) -> HostResult<()>;

    /// Enter standby now.
    async fn suspend_now(&self) -> HostResult<()>;

    /// Hibernate now.
    async fn hibernate_now(&self) -> HostResult<()>;

    /// Shut the machine down now.
    async fn shutdown_now(&self) -> HostResult<()>;

    /// Restart the machine now.
    async fn restart_now(&self) -> HostResult<()>;

    /// Dispatch a [`PowerAction`] to the matching primitive.
    async fn perform(&self, action: PowerAction) -> HostResult<()> {
        match action {
            PowerAction::Standby => self.suspend_now().await,
            PowerAction::Hibernate => self.hibernate_now().await,
            PowerAction::Restart => self.restart_now().await,
            PowerAction::Shutdown => self.shutdown_now().await,
        }
    }
}
