//! Configuration validation

use crate::schema::{RawConfig, RawRateCheck, RawThresholdCheck};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use slumber_util::PluginGuid;
use std::collections::HashSet;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Schedule '{schedule_id}': {message}")]
    ScheduleError {
        schedule_id: String,
        message: String,
    },

    #[error("Duplicate schedule ID: {0}")]
    DuplicateScheduleId(String),

    #[error("Invalid datetime '{value}': expected 'YYYY-MM-DD HH:MM:SS' or RFC 3339")]
    InvalidDateTime { value: String },

    #[error("Check '{check}': {message}")]
    CheckError { check: String, message: String },

    #[error("Invalid plugin GUID: {0}")]
    InvalidPluginGuid(String),

    #[error("Global config error: {0}")]
    GlobalError(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // Duplicate schedule IDs, across both schedule kinds
    let mut seen_ids = HashSet::new();
    for id in config
        .wake_schedules
        .iter()
        .map(|s| &s.id)
        .chain(config.uptime_schedules.iter().map(|s| &s.id))
    {
        if !seen_ids.insert(id) {
            errors.push(ValidationError::DuplicateScheduleId(id.clone()));
        }
    }

    for schedule in &config.wake_schedules {
        errors.extend(validate_schedule(
            &schedule.id,
            &schedule.due_time,
            schedule.repeat_after_minutes,
            schedule.end_time.as_deref(),
            None,
        ));
    }
    for schedule in &config.uptime_schedules {
        errors.extend(validate_schedule(
            &schedule.id,
            &schedule.due_time,
            schedule.repeat_after_minutes,
            schedule.end_time.as_deref(),
            Some(schedule.duration_minutes),
        ));
    }

    errors.extend(validate_threshold(&config.checks.cpu, "cpu"));
    errors.extend(validate_threshold(&config.checks.memory, "memory"));
    errors.extend(validate_rate(&config.checks.network, "network"));
    errors.extend(validate_rate(&config.checks.disk, "disk"));

    if config.checks.processes.enabled && config.checks.processes.names.is_empty() {
        errors.push(ValidationError::CheckError {
            check: "processes".into(),
            message: "enabled but no process names configured".into(),
        });
    }
    if config.checks.hosts.enabled && config.checks.hosts.hosts.is_empty() {
        errors.push(ValidationError::CheckError {
            check: "hosts".into(),
            message: "enabled but no hosts configured".into(),
        });
    }

    if config.remote.enabled {
        if let Some(0) = config.remote.port {
            errors.push(ValidationError::GlobalError(
                "remote.port must not be 0".into(),
            ));
        }
    }

    for guid in &config.plugins.active {
        if PluginGuid::parse(guid).is_err() {
            errors.push(ValidationError::InvalidPluginGuid(guid.clone()));
        }
    }

    errors
}

fn validate_schedule(
    id: &str,
    due_time: &str,
    repeat_after_minutes: Option<u64>,
    end_time: Option<&str>,
    duration_minutes: Option<u64>,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if id.is_empty() {
        errors.push(ValidationError::GlobalError(
            "schedule id cannot be empty".into(),
        ));
    }

    let due = match parse_datetime(due_time) {
        Ok(dt) => Some(dt),
        Err(_) => {
            errors.push(ValidationError::InvalidDateTime {
                value: due_time.to_string(),
            });
            None
        }
    };

    if let Some(end_str) = end_time {
        match parse_datetime(end_str) {
            Ok(end) => {
                if let Some(due) = due {
                    if end <= due {
                        errors.push(ValidationError::ScheduleError {
                            schedule_id: id.to_string(),
                            message: "end_time must be after due_time".into(),
                        });
                    }
                }
            }
            Err(_) => errors.push(ValidationError::InvalidDateTime {
                value: end_str.to_string(),
            }),
        }
    }

    if repeat_after_minutes == Some(0) {
        errors.push(ValidationError::ScheduleError {
            schedule_id: id.to_string(),
            message: "repeat_after_minutes must be positive".into(),
        });
    }

    if duration_minutes == Some(0) {
        errors.push(ValidationError::ScheduleError {
            schedule_id: id.to_string(),
            message: "duration_minutes must be positive".into(),
        });
    }

    errors
}

fn validate_threshold(check: &RawThresholdCheck, name: &str) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if check.enabled {
        match check.threshold_percent {
            None => errors.push(ValidationError::CheckError {
                check: name.to_string(),
                message: "enabled but threshold_percent missing".into(),
            }),
            Some(t) if !(0.0..=100.0).contains(&t) => {
                errors.push(ValidationError::CheckError {
                    check: name.to_string(),
                    message: format!("threshold_percent {} outside 0-100", t),
                })
            }
            _ => {}
        }
    }
    errors
}

fn validate_rate(check: &RawRateCheck, name: &str) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if check.enabled && check.threshold_kbps.is_none() {
        errors.push(ValidationError::CheckError {
            check: name.to_string(),
            message: "enabled but threshold_kbps missing".into(),
        });
    }
    errors
}

/// Parse a config datetime: local "YYYY-MM-DD HH:MM:SS" or RFC 3339
pub fn parse_datetime(s: &str) -> Result<DateTime<Local>, String> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Local
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(|| format!("Ambiguous local time: {}", s));
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| format!("Invalid datetime: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RawWakeSchedule;

    #[test]
    fn test_parse_datetime() {
        assert!(parse_datetime("2025-06-10 08:00:00").is_ok());
        assert!(parse_datetime("2025-06-10T08:00:00+02:00").is_ok());

        assert!(parse_datetime("2025-06-10").is_err());
        assert!(parse_datetime("08:00").is_err());
        assert!(parse_datetime("not a date").is_err());
    }

    #[test]
    fn test_duplicate_schedule_ids() {
        let mut config = RawConfig::default();
        config.config_version = 1;
        for _ in 0..2 {
            config.wake_schedules.push(RawWakeSchedule {
                id: "nightly".into(),
                enabled: true,
                due_time: "2025-06-10 03:00:00".into(),
                repeat_after_minutes: None,
                end_time: None,
            });
        }

        let errors = validate_config(&config);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::DuplicateScheduleId(_))));
    }

    #[test]
    fn test_end_before_due_rejected() {
        let mut config = RawConfig::default();
        config.config_version = 1;
        config.wake_schedules.push(RawWakeSchedule {
            id: "broken".into(),
            enabled: true,
            due_time: "2025-06-10 08:00:00".into(),
            repeat_after_minutes: Some(60),
            end_time: Some("2025-06-10 07:00:00".into()),
        });

        let errors = validate_config(&config);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::ScheduleError { .. })));
    }

    #[test]
    fn test_enabled_check_needs_threshold() {
        let mut config = RawConfig::default();
        config.config_version = 1;
        config.checks.cpu.enabled = true;

        let errors = validate_config(&config);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::CheckError { .. })));
    }

    #[test]
    fn test_bad_plugin_guid() {
        let mut config = RawConfig::default();
        config.config_version = 1;
        config.plugins.active.push("not-a-guid".into());

        let errors = validate_config(&config);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidPluginGuid(_))));
    }
}
