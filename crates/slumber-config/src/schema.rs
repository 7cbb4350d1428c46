//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    #[serde(default)]
    pub config_version: u32,

    /// Global daemon settings
    #[serde(default)]
    pub daemon: RawDaemonConfig,

    /// Built-in policy check settings
    #[serde(default)]
    pub checks: RawChecks,

    /// Remote shutdown listener
    #[serde(default)]
    pub remote: RawRemoteConfig,

    /// Plugin activation
    #[serde(default)]
    pub plugins: RawPluginConfig,

    /// Wake schedules
    #[serde(default)]
    pub wake_schedules: Vec<RawWakeSchedule>,

    /// Uptime schedules
    #[serde(default)]
    pub uptime_schedules: Vec<RawUptimeSchedule>,

    /// Commands fired on the tick outcome
    #[serde(default)]
    pub actions: RawActionConfig,

    /// Side effects run after every resume from standby
    #[serde(default)]
    pub wake_actions: RawWakeActionConfig,
}

/// Daemon-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDaemonConfig {
    /// Log directory (crash reports land here too)
    pub log_dir: Option<PathBuf>,

    /// Plugin root directory; immediate subdirectories are load units
    pub plugin_dir: Option<PathBuf>,

    /// Temporary-uptime marker file path
    pub uptime_marker: Option<PathBuf>,

    /// Monitoring interval in minutes
    pub monitoring_interval_minutes: Option<u64>,
}

/// All built-in check settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawChecks {
    #[serde(default)]
    pub cpu: RawThresholdCheck,

    #[serde(default)]
    pub memory: RawThresholdCheck,

    #[serde(default)]
    pub network: RawRateCheck,

    #[serde(default)]
    pub disk: RawRateCheck,

    #[serde(default)]
    pub processes: RawProcessCheck,

    #[serde(default)]
    pub hosts: RawHostCheck,

    #[serde(default)]
    pub shares: RawShareCheck,
}

/// A load check against a percentage threshold
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawThresholdCheck {
    #[serde(default)]
    pub enabled: bool,

    /// Suspend sleep while load is at or above this percentage
    pub threshold_percent: Option<f32>,
}

/// A throughput check against a KiB/s threshold
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRateCheck {
    #[serde(default)]
    pub enabled: bool,

    /// Suspend sleep while throughput is at or above this rate
    pub threshold_kbps: Option<u64>,

    /// Device names to monitor; empty means all
    #[serde(default)]
    pub devices: Vec<String>,
}

/// Monitored processes
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawProcessCheck {
    #[serde(default)]
    pub enabled: bool,

    /// Process names that keep the machine awake while running
    #[serde(default)]
    pub names: Vec<String>,
}

/// Monitored hosts (reachability probe)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawHostCheck {
    #[serde(default)]
    pub enabled: bool,

    /// Hosts that keep the machine awake while reachable
    #[serde(default)]
    pub hosts: Vec<String>,

    /// TCP port used for the reachability probe
    pub probe_port: Option<u16>,

    /// Probe timeout in seconds
    pub timeout_seconds: Option<u64>,
}

/// Network share access check
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawShareCheck {
    #[serde(default)]
    pub enabled: bool,
}

/// Remote shutdown listener
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRemoteConfig {
    #[serde(default)]
    pub enabled: bool,

    /// UDP port to listen on
    pub port: Option<u16>,

    /// Shared secret appended to the magic packet; None disables the
    /// password requirement
    pub password: Option<String>,
}

/// Plugin activation
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawPluginConfig {
    /// GUIDs of activated plugins
    #[serde(default)]
    pub active: Vec<String>,
}

/// Raw wake schedule
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawWakeSchedule {
    /// Unique stable ID
    pub id: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// First due time, "YYYY-MM-DD HH:MM:SS" local or RFC 3339
    pub due_time: String,

    /// Recurrence interval in minutes; absent means one-shot
    pub repeat_after_minutes: Option<u64>,

    /// Last instant the recurrence may produce an occurrence for
    pub end_time: Option<String>,
}

/// Raw uptime schedule
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawUptimeSchedule {
    pub id: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    pub due_time: String,

    /// How long to stay awake after each occurrence, in minutes
    pub duration_minutes: u64,

    pub repeat_after_minutes: Option<u64>,

    pub end_time: Option<String>,
}

/// Commands fired on the tick outcome; each command is an argv array
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawActionConfig {
    #[serde(default)]
    pub on_policy_satisfied: Vec<Vec<String>>,

    #[serde(default)]
    pub on_no_policy: Vec<Vec<String>>,
}

/// Side effects run after every resume from standby
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawWakeActionConfig {
    /// Services restarted after the settle delay
    #[serde(default)]
    pub restart_services: Vec<String>,

    /// Programs started after the settle delay; argv arrays
    #[serde(default)]
    pub start_programs: Vec<Vec<String>>,

    /// Network interfaces to bounce on resume
    #[serde(default)]
    pub reset_network_adapters: Vec<String>,

    /// Settle delay in seconds before services/programs are touched
    pub settle_delay_seconds: Option<u64>,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_checks_section() {
        let toml_str = r#"
            config_version = 1

            [checks.cpu]
            enabled = true
            threshold_percent = 30

            [checks.processes]
            enabled = true
            names = ["rsync", "ffmpeg"]
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert!(config.checks.cpu.enabled);
        assert_eq!(config.checks.cpu.threshold_percent, Some(30.0));
        assert_eq!(config.checks.processes.names.len(), 2);
        assert!(!config.checks.memory.enabled);
    }

    #[test]
    fn parse_schedules() {
        let toml_str = r#"
            config_version = 1

            [[wake_schedules]]
            id = "nightly-backup"
            due_time = "2025-06-10 03:00:00"
            repeat_after_minutes = 1440

            [[uptime_schedules]]
            id = "evening-media"
            due_time = "2025-06-10 19:00:00"
            duration_minutes = 240
            repeat_after_minutes = 1440
            end_time = "2025-12-31 23:59:59"
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.wake_schedules.len(), 1);
        assert!(config.wake_schedules[0].enabled);
        assert_eq!(config.uptime_schedules[0].duration_minutes, 240);
    }

    #[test]
    fn parse_remote_section() {
        let toml_str = r#"
            config_version = 1

            [remote]
            enabled = true
            port = 54545
            password = "secret"
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert!(config.remote.enabled);
        assert_eq!(config.remote.port, Some(54545));
        assert_eq!(config.remote.password.as_deref(), Some("secret"));
    }
}
