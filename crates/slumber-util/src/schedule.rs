//! Wake and uptime schedule descriptors
//!
//! Both schedule kinds share the same recurrence model: a first due time,
//! an optional repeat interval and an optional end time. Recurrence is
//! evaluated lazily — `next_due_time` advances from the original due time
//! until it finds an occurrence that is still in the future, stopping at
//! the end time. Uptime schedules additionally carry a duration: the span
//! after each occurrence during which the machine must stay awake.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ScheduleId;

/// A schedule that wakes the machine at its due times
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WakeSchedule {
    pub id: ScheduleId,
    pub enabled: bool,
    pub due_time: DateTime<Local>,
    pub repeat_after: Option<Duration>,
    pub end_time: Option<DateTime<Local>>,
}

impl WakeSchedule {
    /// Next occurrence strictly in the future, or None if the schedule
    /// is expired.
    pub fn next_due_time(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        let candidate = advance(self.due_time, self.repeat_after, self.end_time, now)?;
        // A wake time in the past is of no use to anyone.
        (candidate > now).then_some(candidate)
    }

    pub fn is_expired(&self, now: DateTime<Local>) -> bool {
        self.next_due_time(now).is_none()
    }
}

/// A schedule that keeps the machine awake for `duration` after each
/// occurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UptimeSchedule {
    pub id: ScheduleId,
    pub enabled: bool,
    pub due_time: DateTime<Local>,
    pub duration: Duration,
    pub repeat_after: Option<Duration>,
    pub end_time: Option<DateTime<Local>>,
}

impl UptimeSchedule {
    /// Next occurrence whose awake window has not yet fully elapsed, or
    /// None if the schedule is expired.
    ///
    /// Unlike wake schedules this may return a time in the past: the last
    /// in-range occurrence stays due until its duration has also elapsed.
    pub fn next_due_time(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        let candidate = advance(self.due_time, self.repeat_after, self.end_time, now)?;
        if candidate > now {
            return Some(candidate);
        }
        let window_end = candidate + chrono::Duration::from_std(self.duration).ok()?;
        (now < window_end).then_some(candidate)
    }

    pub fn is_expired(&self, now: DateTime<Local>) -> bool {
        self.next_due_time(now).is_none()
    }

    /// The awake window covering `now`, if any occurrence is currently
    /// active.
    pub fn active_window(&self, now: DateTime<Local>) -> Option<(DateTime<Local>, DateTime<Local>)> {
        let start = last_occurrence_at_or_before(
            self.due_time,
            self.repeat_after,
            self.end_time,
            now,
        )?;
        let end = start + chrono::Duration::from_std(self.duration).ok()?;
        (now < end).then_some((start, end))
    }
}

/// Either schedule kind, as handed to the wake scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Schedule {
    Wake(WakeSchedule),
    Uptime(UptimeSchedule),
}

impl Schedule {
    pub fn id(&self) -> &ScheduleId {
        match self {
            Schedule::Wake(s) => &s.id,
            Schedule::Uptime(s) => &s.id,
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            Schedule::Wake(s) => s.enabled,
            Schedule::Uptime(s) => s.enabled,
        }
    }

    pub fn next_due_time(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        match self {
            Schedule::Wake(s) => s.next_due_time(now),
            Schedule::Uptime(s) => s.next_due_time(now),
        }
    }
}

/// Advance `due` by whole repeat intervals until the candidate is in the
/// future, honoring the end time.
///
/// Returns the first future occurrence, or the last in-range occurrence
/// when the end time stops the recurrence short of `now` (callers decide
/// whether a past occurrence is still useful). Returns None when the
/// schedule cannot produce any occurrence at all.
fn advance(
    due: DateTime<Local>,
    repeat_after: Option<Duration>,
    end_time: Option<DateTime<Local>>,
    now: DateTime<Local>,
) -> Option<DateTime<Local>> {
    if let Some(end) = end_time {
        if due > end {
            return None;
        }
    }

    let interval = match repeat_after {
        Some(i) if !i.is_zero() => chrono::Duration::from_std(i).ok()?,
        _ => return Some(due),
    };

    let mut candidate = skip_towards(due, interval, end_time, now);
    while candidate <= now {
        let next = candidate + interval;
        if let Some(end) = end_time {
            if next > end {
                // The recurrence ends here; the previous occurrence is the
                // final one.
                return Some(candidate);
            }
        }
        candidate = next;
    }
    Some(candidate)
}

/// Last occurrence at or before `now`, honoring the end time.
fn last_occurrence_at_or_before(
    due: DateTime<Local>,
    repeat_after: Option<Duration>,
    end_time: Option<DateTime<Local>>,
    now: DateTime<Local>,
) -> Option<DateTime<Local>> {
    if due > now {
        return None;
    }
    if let Some(end) = end_time {
        if due > end {
            return None;
        }
    }

    let interval = match repeat_after {
        Some(i) if !i.is_zero() => chrono::Duration::from_std(i).ok()?,
        _ => return Some(due),
    };

    let mut candidate = skip_towards(due, interval, end_time, now);
    loop {
        let next = candidate + interval;
        if next > now {
            return Some(candidate);
        }
        if let Some(end) = end_time {
            if next > end {
                return Some(candidate);
            }
        }
        candidate = next;
    }
}

/// Jump in one step close to the target so the per-interval loop stays
/// bounded even for schedules that are years behind.
fn skip_towards(
    due: DateTime<Local>,
    interval: chrono::Duration,
    end_time: Option<DateTime<Local>>,
    now: DateTime<Local>,
) -> DateTime<Local> {
    let mut horizon = now;
    if let Some(end) = end_time {
        if end < horizon {
            horizon = end;
        }
    }
    if horizon <= due {
        return due;
    }

    let interval_ms = interval.num_milliseconds().max(1);
    let behind_ms = (horizon - due).num_milliseconds();
    let steps = behind_ms / interval_ms;
    due + chrono::Duration::milliseconds(interval_ms.saturating_mul(steps))
}
