//! Event types exchanged between the engine, scheduler and daemon

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use slumber_util::ScheduleId;

/// OS power notifications delivered to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerEvent {
    /// The machine is about to suspend.
    Suspend,
    /// The machine has resumed from suspend.
    Resume,
}

/// Notifications from the wake scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeEvent {
    /// A wake timer reached its due time.
    Completed {
        schedule_id: ScheduleId,
        due: DateTime<Local>,
    },
    /// A still-pending wake timer was cancelled (schedules reloaded or
    /// service stopping). Timers that already fired do not emit this.
    Cancelled { schedule_id: ScheduleId },
}
