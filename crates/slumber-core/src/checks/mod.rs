//! Built-in policy checks
//!
//! Each check answers one question per tick: is there a reason to keep the
//! machine awake right now? Checks are evaluated in a fixed order and the
//! first suspending verdict wins; later checks are not consulted.

mod hosts;
mod load;
mod processes;
mod shares;
mod throughput;
mod uptime;

pub use hosts::*;
pub use load::*;
pub use processes::*;
pub use shares::*;
pub use throughput::*;
pub use uptime::*;

use async_trait::async_trait;
use slumber_api::Verdict;
use slumber_config::Settings;
use thiserror::Error;

/// Errors from a single check evaluation.
///
/// A failing check abstains for the tick; the engine logs and moves on.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse {source_name}: {message}")]
    Parse {
        source_name: &'static str,
        message: String,
    },

    #[error("Command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },
}

pub type CheckResult = Result<Verdict, CheckError>;

/// One built-in policy check
#[async_trait]
pub trait PolicyCheck: Send + Sync {
    fn name(&self) -> &'static str;

    /// Uptime-window checks suspend sleep without firing the configured
    /// policy action commands.
    fn is_uptime_window(&self) -> bool {
        false
    }

    async fn check(&mut self) -> CheckResult;
}

/// Build the enabled checks in evaluation order.
///
/// Uptime windows come first so that a scheduled stay-awake never triggers
/// the policy action commands meant for workload-driven suspensions.
pub fn build_checks(settings: &Settings) -> Vec<Box<dyn PolicyCheck>> {
    let mut checks: Vec<Box<dyn PolicyCheck>> = Vec::new();

    checks.push(Box::new(UptimeMarkerCheck::new(
        settings.daemon.uptime_marker.clone(),
    )));
    if !settings.uptime_schedules.is_empty() {
        checks.push(Box::new(UptimeScheduleCheck::new(
            settings.uptime_schedules.clone(),
        )));
    }
    if settings.checks.processes.enabled {
        checks.push(Box::new(ProcessCheck::new(
            settings.checks.processes.names.clone(),
        )));
    }
    if settings.checks.shares.enabled {
        checks.push(Box::new(ShareCheck::new()));
    }
    if settings.checks.cpu.enabled {
        checks.push(Box::new(CpuCheck::new(
            settings.checks.cpu.threshold_percent,
        )));
    }
    if settings.checks.memory.enabled {
        checks.push(Box::new(MemoryCheck::new(
            settings.checks.memory.threshold_percent,
        )));
    }
    if settings.checks.hosts.enabled {
        checks.push(Box::new(HostReachableCheck::new(
            settings.checks.hosts.hosts.clone(),
            settings.checks.hosts.probe_port,
            settings.checks.hosts.timeout,
        )));
    }
    if settings.checks.network.enabled {
        checks.push(Box::new(NetworkRateCheck::new(
            settings.checks.network.threshold_kbps,
            settings.checks.network.devices.clone(),
        )));
    }
    if settings.checks.disk.enabled {
        checks.push(Box::new(DiskRateCheck::new(
            settings.checks.disk.threshold_kbps,
            settings.checks.disk.devices.clone(),
        )));
    }

    checks
}
