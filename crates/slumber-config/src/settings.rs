//! Validated settings snapshot

use crate::schema::{
    RawChecks, RawConfig, RawDaemonConfig, RawHostCheck, RawProcessCheck, RawRateCheck,
    RawRemoteConfig, RawThresholdCheck, RawUptimeSchedule, RawWakeActionConfig, RawWakeSchedule,
};
use crate::validation::parse_datetime;
use chrono::Local;
use slumber_util::{PluginGuid, ScheduleId, UptimeSchedule, WakeSchedule};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Default UDP port for the remote shutdown listener
pub const DEFAULT_REMOTE_PORT: u16 = 54545;

/// Immutable, validated settings snapshot consumed by the engine.
///
/// Never mutated in place; the daemon builds a new one on every reload.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub daemon: DaemonSettings,
    pub checks: CheckSettings,
    pub remote: RemoteSettings,
    pub active_plugins: HashSet<PluginGuid>,
    pub wake_schedules: Vec<WakeSchedule>,
    pub uptime_schedules: Vec<UptimeSchedule>,
    pub actions: ActionSettings,
    pub wake_actions: WakeActionSettings,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            daemon: DaemonSettings::from_raw(raw.daemon),
            checks: CheckSettings::from_raw(raw.checks),
            remote: RemoteSettings::from_raw(raw.remote),
            active_plugins: raw
                .plugins
                .active
                .iter()
                .filter_map(|g| PluginGuid::parse(g).ok())
                .collect(),
            wake_schedules: raw
                .wake_schedules
                .into_iter()
                .map(convert_wake_schedule)
                .collect(),
            uptime_schedules: raw
                .uptime_schedules
                .into_iter()
                .map(convert_uptime_schedule)
                .collect(),
            actions: ActionSettings {
                on_policy_satisfied: raw.actions.on_policy_satisfied,
                on_no_policy: raw.actions.on_no_policy,
            },
            wake_actions: WakeActionSettings::from_raw(raw.wake_actions),
        }
    }
}

/// Daemon-level settings
#[derive(Debug, Clone)]
pub struct DaemonSettings {
    pub log_dir: PathBuf,
    pub plugin_dir: PathBuf,
    pub uptime_marker: PathBuf,
    pub monitoring_interval: Duration,
}

impl DaemonSettings {
    fn from_raw(raw: RawDaemonConfig) -> Self {
        let defaults = Self::default();
        Self {
            log_dir: raw.log_dir.unwrap_or(defaults.log_dir),
            plugin_dir: raw.plugin_dir.unwrap_or(defaults.plugin_dir),
            uptime_marker: raw.uptime_marker.unwrap_or(defaults.uptime_marker),
            monitoring_interval: raw
                .monitoring_interval_minutes
                .map(|m| Duration::from_secs(m.max(1) * 60))
                .unwrap_or(defaults.monitoring_interval),
        }
    }
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("/var/log/slumberd"),
            plugin_dir: PathBuf::from("/var/lib/slumberd/plugins"),
            uptime_marker: PathBuf::from("/var/lib/slumberd/uptime-until"),
            monitoring_interval: Duration::from_secs(10 * 60),
        }
    }
}

/// All built-in check settings
#[derive(Debug, Clone, Default)]
pub struct CheckSettings {
    pub cpu: ThresholdCheckSettings,
    pub memory: ThresholdCheckSettings,
    pub network: RateCheckSettings,
    pub disk: RateCheckSettings,
    pub processes: ProcessCheckSettings,
    pub hosts: HostCheckSettings,
    pub shares: ShareCheckSettings,
}

impl CheckSettings {
    fn from_raw(raw: RawChecks) -> Self {
        Self {
            cpu: ThresholdCheckSettings::from_raw(raw.cpu),
            memory: ThresholdCheckSettings::from_raw(raw.memory),
            network: RateCheckSettings::from_raw(raw.network),
            disk: RateCheckSettings::from_raw(raw.disk),
            processes: ProcessCheckSettings::from_raw(raw.processes),
            hosts: HostCheckSettings::from_raw(raw.hosts),
            shares: ShareCheckSettings {
                enabled: raw.shares.enabled,
            },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ThresholdCheckSettings {
    pub enabled: bool,
    pub threshold_percent: f32,
}

impl ThresholdCheckSettings {
    fn from_raw(raw: RawThresholdCheck) -> Self {
        Self {
            enabled: raw.enabled,
            threshold_percent: raw.threshold_percent.unwrap_or(100.0),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RateCheckSettings {
    pub enabled: bool,
    pub threshold_kbps: u64,
    /// Device names to monitor; empty means all
    pub devices: Vec<String>,
}

impl RateCheckSettings {
    fn from_raw(raw: RawRateCheck) -> Self {
        Self {
            enabled: raw.enabled,
            threshold_kbps: raw.threshold_kbps.unwrap_or(u64::MAX),
            devices: raw.devices,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProcessCheckSettings {
    pub enabled: bool,
    pub names: Vec<String>,
}

impl ProcessCheckSettings {
    fn from_raw(raw: RawProcessCheck) -> Self {
        Self {
            enabled: raw.enabled,
            names: raw.names,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HostCheckSettings {
    pub enabled: bool,
    pub hosts: Vec<String>,
    pub probe_port: u16,
    pub timeout: Duration,
}

impl HostCheckSettings {
    fn from_raw(raw: RawHostCheck) -> Self {
        Self {
            enabled: raw.enabled,
            hosts: raw.hosts,
            probe_port: raw.probe_port.unwrap_or(445),
            timeout: Duration::from_secs(raw.timeout_seconds.unwrap_or(2)),
        }
    }
}

impl Default for HostCheckSettings {
    fn default() -> Self {
        Self::from_raw(RawHostCheck::default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShareCheckSettings {
    pub enabled: bool,
}

/// Remote shutdown listener settings
#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub enabled: bool,
    pub port: u16,
    pub password: Option<String>,
}

impl RemoteSettings {
    fn from_raw(raw: RawRemoteConfig) -> Self {
        Self {
            enabled: raw.enabled,
            port: raw.port.unwrap_or(DEFAULT_REMOTE_PORT),
            password: raw.password,
        }
    }
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self::from_raw(RawRemoteConfig::default())
    }
}

/// Commands fired on the tick outcome
#[derive(Debug, Clone, Default)]
pub struct ActionSettings {
    pub on_policy_satisfied: Vec<Vec<String>>,
    pub on_no_policy: Vec<Vec<String>>,
}

/// Side effects run after every resume from standby
#[derive(Debug, Clone)]
pub struct WakeActionSettings {
    pub restart_services: Vec<String>,
    pub start_programs: Vec<Vec<String>>,
    pub reset_network_adapters: Vec<String>,
    pub settle_delay: Duration,
}

impl WakeActionSettings {
    fn from_raw(raw: RawWakeActionConfig) -> Self {
        Self {
            restart_services: raw.restart_services,
            start_programs: raw.start_programs,
            reset_network_adapters: raw.reset_network_adapters,
            settle_delay: Duration::from_secs(raw.settle_delay_seconds.unwrap_or(30)),
        }
    }
}

impl Default for WakeActionSettings {
    fn default() -> Self {
        Self::from_raw(RawWakeActionConfig::default())
    }
}

fn convert_wake_schedule(raw: RawWakeSchedule) -> WakeSchedule {
    WakeSchedule {
        id: ScheduleId::new(raw.id),
        enabled: raw.enabled,
        due_time: parse_datetime(&raw.due_time).unwrap_or_else(|_| Local::now()),
        repeat_after: raw
            .repeat_after_minutes
            .map(|m| Duration::from_secs(m * 60)),
        end_time: raw.end_time.as_deref().and_then(|s| parse_datetime(s).ok()),
    }
}

fn convert_uptime_schedule(raw: RawUptimeSchedule) -> UptimeSchedule {
    UptimeSchedule {
        id: ScheduleId::new(raw.id),
        enabled: raw.enabled,
        due_time: parse_datetime(&raw.due_time).unwrap_or_else(|_| Local::now()),
        duration: Duration::from_secs(raw.duration_minutes * 60),
        repeat_after: raw
            .repeat_after_minutes
            .map(|m| Duration::from_secs(m * 60)),
        end_time: raw.end_time.as_deref().and_then(|s| parse_datetime(s).ok()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_settings;

    #[test]
    fn defaults_are_quiet() {
        let settings = Settings::default();
        assert!(!settings.checks.cpu.enabled);
        assert!(!settings.remote.enabled);
        assert_eq!(settings.remote.port, DEFAULT_REMOTE_PORT);
        assert_eq!(
            settings.daemon.monitoring_interval,
            Duration::from_secs(600)
        );
    }

    #[test]
    fn full_round_trip() {
        let settings = parse_settings(
            r#"
            config_version = 1

            [daemon]
            monitoring_interval_minutes = 5

            [checks.memory]
            enabled = true
            threshold_percent = 85

            [checks.hosts]
            enabled = true
            hosts = ["nas.local"]
            probe_port = 445

            [remote]
            enabled = true
            password = "hunter2"

            [plugins]
            active = ["6f2c4b4e-9a1d-4f3a-8c2e-0b5d7e6a1c9f"]

            [[uptime_schedules]]
            id = "media"
            due_time = "2025-06-10 19:00:00"
            duration_minutes = 120

            [wake_actions]
            restart_services = ["smbd"]
            settle_delay_seconds = 10
        "#,
        )
        .unwrap();

        assert_eq!(settings.daemon.monitoring_interval, Duration::from_secs(300));
        assert!(settings.checks.memory.enabled);
        assert_eq!(settings.checks.hosts.hosts, vec!["nas.local"]);
        assert_eq!(settings.remote.password.as_deref(), Some("hunter2"));
        assert_eq!(settings.active_plugins.len(), 1);
        assert_eq!(settings.uptime_schedules.len(), 1);
        assert_eq!(
            settings.uptime_schedules[0].duration,
            Duration::from_secs(7200)
        );
        assert_eq!(settings.wake_actions.restart_services, vec!["smbd"]);
        assert_eq!(settings.wake_actions.settle_delay, Duration::from_secs(10));
    }
}
