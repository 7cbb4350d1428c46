//! Uptime-window checks: the temporary marker file and configured
//! uptime schedules

use async_trait::async_trait;
use chrono::{DateTime, Local};
use slumber_api::Verdict;
use slumber_util::{format_duration, UptimeSchedule};
use std::path::PathBuf;
use tracing::{info, warn};

use super::{CheckResult, PolicyCheck};

/// Keeps the machine awake while the marker file holds a future end time.
///
/// The marker is a plain file containing one RFC 3339 timestamp: "stay
/// awake until this instant". Anything may write it (a helper script, an
/// admin); this check deletes it once the instant has passed.
pub struct UptimeMarkerCheck {
    marker_path: PathBuf,
}

impl UptimeMarkerCheck {
    pub fn new(marker_path: PathBuf) -> Self {
        Self { marker_path }
    }

    fn read_marker(&self) -> Option<DateTime<Local>> {
        let content = std::fs::read_to_string(&self.marker_path).ok()?;
        match DateTime::parse_from_rfc3339(content.trim()) {
            Ok(dt) => Some(dt.with_timezone(&Local)),
            Err(e) => {
                warn!(
                    path = %self.marker_path.display(),
                    error = %e,
                    "Unreadable uptime marker, removing"
                );
                let _ = std::fs::remove_file(&self.marker_path);
                None
            }
        }
    }
}

#[async_trait]
impl PolicyCheck for UptimeMarkerCheck {
    fn name(&self) -> &'static str {
        "uptime-marker"
    }

    fn is_uptime_window(&self) -> bool {
        true
    }

    async fn check(&mut self) -> CheckResult {
        let Some(until) = self.read_marker() else {
            return Ok(Verdict::allow());
        };

        let now = Local::now();
        if now < until {
            let remaining = (until - now).to_std().unwrap_or_default();
            return Ok(Verdict::suspend(format!(
                "Temporary uptime requested for another {}",
                format_duration(remaining)
            )));
        }

        info!(path = %self.marker_path.display(), "Uptime marker expired, removing");
        let _ = std::fs::remove_file(&self.marker_path);
        Ok(Verdict::allow())
    }
}

/// Keeps the machine awake inside any active uptime schedule window.
pub struct UptimeScheduleCheck {
    schedules: Vec<UptimeSchedule>,
}

impl UptimeScheduleCheck {
    pub fn new(schedules: Vec<UptimeSchedule>) -> Self {
        Self { schedules }
    }

    fn active_reason(&self, now: DateTime<Local>) -> Option<String> {
        self.schedules
            .iter()
            .filter(|s| s.enabled)
            .find_map(|s| {
                s.active_window(now).map(|(_, end)| {
                    format!(
                        "Uptime schedule '{}' active until {}",
                        s.id,
                        end.format("%H:%M")
                    )
                })
            })
    }
}

#[async_trait]
impl PolicyCheck for UptimeScheduleCheck {
    fn name(&self) -> &'static str {
        "uptime-schedules"
    }

    fn is_uptime_window(&self) -> bool {
        true
    }

    async fn check(&mut self) -> CheckResult {
        Ok(match self.active_reason(Local::now()) {
            Some(reason) => Verdict::suspend(reason),
            None => Verdict::allow(),
        })
    }
}
