//! Wake scheduler: turns configured schedules into hardware wake timers

use chrono::{DateTime, Local};
use slumber_api::WakeEvent;
use slumber_host_api::PowerHost;
use slumber_util::{Schedule, ScheduleId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Re-check the wall clock at least this often while waiting. Monotonic
/// sleeps pause during standby, so the slice bounds how late a past-due
/// timer can report after the RTC wakes the machine; it also covers
/// wall-clock jumps (NTP, DST).
const MAX_SLEEP_SLICE: Duration = Duration::from_secs(30);

/// One timer task per enabled schedule, re-armed after every occurrence.
///
/// The hardware has a single wake alarm, so the scheduler keeps a map of
/// every pending due time and arms the alarm at the earliest one; the map
/// is updated whenever a timer fires, expires or is cancelled.
pub struct WakeScheduler {
    host: Arc<dyn PowerHost>,
    events_tx: mpsc::UnboundedSender<WakeEvent>,
    pending: Arc<Mutex<HashMap<ScheduleId, DateTime<Local>>>>,
    cancel_tx: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

impl WakeScheduler {
    pub fn new(host: Arc<dyn PowerHost>, events_tx: mpsc::UnboundedSender<WakeEvent>) -> Self {
        Self {
            host,
            events_tx,
            pending: Arc::new(Mutex::new(HashMap::new())),
            cancel_tx: None,
            tasks: Vec::new(),
        }
    }

    /// Replace the active schedule set. Still-pending timers are cancelled
    /// (emitting [`WakeEvent::Cancelled`]); timers that already fired are
    /// left alone.
    pub async fn apply(&mut self, schedules: &[Schedule]) {
        self.cancel_tasks().await;

        if !self.host.query_wake_timers_allowed() {
            if schedules.iter().any(|s| s.enabled()) {
                warn!("Host cannot arm wake timers; schedules will not wake the machine");
            }
            return;
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.cancel_tx = Some(cancel_tx);

        let now = Local::now();
        for schedule in schedules {
            if !schedule.enabled() {
                continue;
            }
            let Some(due) = next_future_due(schedule, now) else {
                debug!(schedule = %schedule.id(), "Schedule expired, not arming");
                continue;
            };
            info!(schedule = %schedule.id(), due = %due, "Arming wake timer");
            self.tasks.push(tokio::spawn(timer_task(
                schedule.clone(),
                due,
                self.host.clone(),
                self.events_tx.clone(),
                self.pending.clone(),
                cancel_rx.clone(),
            )));
        }
    }

    /// Cancel everything and disarm the hardware alarm.
    pub async fn stop(&mut self) {
        self.cancel_tasks().await;
        if self.host.query_wake_timers_allowed() {
            if let Err(e) = self.host.cancel_wake_timer().await {
                warn!(error = %e, "Failed to disarm wake timer");
            }
        }
    }

    async fn cancel_tasks(&mut self) {
        if let Some(cancel) = self.cancel_tx.take() {
            let _ = cancel.send(true);
        }
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

/// The earliest occurrence strictly after `now`.
///
/// An uptime schedule whose window is currently open reports its (past)
/// window start from `next_due_time`; the machine is already awake then,
/// so the timer targets the following occurrence instead.
fn next_future_due(schedule: &Schedule, now: DateTime<Local>) -> Option<DateTime<Local>> {
    let candidate = schedule.next_due_time(now)?;
    if candidate > now {
        return Some(candidate);
    }
    match schedule {
        Schedule::Uptime(s) => {
            let window_end = candidate + chrono::Duration::from_std(s.duration).ok()?;
            let next = schedule.next_due_time(window_end)?;
            (next > now).then_some(next)
        }
        Schedule::Wake(_) => None,
    }
}

async fn timer_task(
    schedule: Schedule,
    mut due: DateTime<Local>,
    host: Arc<dyn PowerHost>,
    events_tx: mpsc::UnboundedSender<WakeEvent>,
    pending: Arc<Mutex<HashMap<ScheduleId, DateTime<Local>>>>,
    mut cancel: watch::Receiver<bool>,
) {
    let id = schedule.id().clone();
    loop {
        pending.lock().unwrap().insert(id.clone(), due);
        rearm_hardware(&host, &pending).await;

        // Sleep in slices so a clock jump is noticed within one slice.
        let fired = loop {
            let remaining = (due - Local::now()).to_std().unwrap_or(Duration::ZERO);
            if remaining.is_zero() {
                break true;
            }
            let slice = remaining.min(MAX_SLEEP_SLICE);
            tokio::select! {
                _ = tokio::time::sleep(slice) => {}
                changed = cancel.changed() => {
                    // A dropped sender counts as cancellation.
                    if changed.is_err() || *cancel.borrow() {
                        break false;
                    }
                }
            }
        };

        pending.lock().unwrap().remove(&id);
        rearm_hardware(&host, &pending).await;

        if !fired {
            debug!(schedule = %id, "Wake timer cancelled while pending");
            let _ = events_tx.send(WakeEvent::Cancelled {
                schedule_id: id.clone(),
            });
            return;
        }

        info!(schedule = %id, due = %due, "Wake timer fired");
        let _ = events_tx.send(WakeEvent::Completed {
            schedule_id: id.clone(),
            due,
        });

        match next_future_due(&schedule, Local::now()) {
            Some(next) => {
                debug!(schedule = %id, due = %next, "Re-arming for next occurrence");
                due = next;
            }
            None => {
                debug!(schedule = %id, "Schedule exhausted");
                return;
            }
        }
    }
}

async fn rearm_hardware(
    host: &Arc<dyn PowerHost>,
    pending: &Arc<Mutex<HashMap<ScheduleId, DateTime<Local>>>>,
) {
    let earliest = pending.lock().unwrap().values().min().copied();
    let result = match earliest {
        Some(at) => host.create_wake_timer(at).await,
        None => host.cancel_wake_timer().await,
    };
    if let Err(e) = result {
        warn!(error = %e, "Failed to update hardware wake alarm");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slumber_host_api::{HostOp, MockPowerHost};
    use slumber_util::WakeSchedule;

    fn wake_in(ms: i64, repeat: Option<Duration>) -> Schedule {
        Schedule::Wake(WakeSchedule {
            id: ScheduleId::new("test"),
            enabled: true,
            due_time: Local::now() + chrono::Duration::milliseconds(ms),
            repeat_after: repeat,
            end_time: None,
        })
    }

    #[tokio::test]
    async fn timer_fires_and_emits_completed() {
        let host = Arc::new(MockPowerHost::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = WakeScheduler::new(host.clone(), tx);

        scheduler.apply(&[wake_in(100, None)]).await;

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, WakeEvent::Completed { schedule_id, .. }
            if schedule_id.as_str() == "test"));
        assert!(host
            .ops()
            .iter()
            .any(|op| matches!(op, HostOp::CreateWakeTimer { .. })));

        // Fired one-shots do not emit Cancelled on shutdown.
        scheduler.stop().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn pending_timer_cancelled_on_stop() {
        let host = Arc::new(MockPowerHost::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = WakeScheduler::new(host.clone(), tx);

        scheduler.apply(&[wake_in(60_000, None)]).await;
        scheduler.stop().await;

        let event = rx.try_recv().unwrap();
        assert!(matches!(event, WakeEvent::Cancelled { schedule_id }
            if schedule_id.as_str() == "test"));
        assert!(host
            .ops()
            .iter()
            .any(|op| matches!(op, HostOp::CancelWakeTimer)));
    }

    #[tokio::test]
    async fn recurring_timer_rearms() {
        let host = Arc::new(MockPowerHost::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = WakeScheduler::new(host.clone(), tx);

        scheduler
            .apply(&[wake_in(50, Some(Duration::from_millis(150)))])
            .await;

        for _ in 0..2 {
            let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(matches!(event, WakeEvent::Completed { .. }));
        }
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn disabled_and_expired_schedules_not_armed() {
        let host = Arc::new(MockPowerHost::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = WakeScheduler::new(host.clone(), tx);

        let mut disabled = wake_in(60_000, None);
        if let Schedule::Wake(s) = &mut disabled {
            s.enabled = false;
        }
        let expired = Schedule::Wake(WakeSchedule {
            id: ScheduleId::new("expired"),
            enabled: true,
            due_time: Local::now() - chrono::Duration::hours(1),
            repeat_after: None,
            end_time: None,
        });

        scheduler.apply(&[disabled, expired]).await;
        scheduler.stop().await;
        assert!(rx.try_recv().is_err());
        assert!(!host
            .ops()
            .iter()
            .any(|op| matches!(op, HostOp::CreateWakeTimer { .. })));
    }

    #[tokio::test]
    async fn no_timers_without_host_support() {
        let host = Arc::new(
            MockPowerHost::new()
                .with_capabilities(slumber_host_api::HostCapabilities::fallback()),
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut scheduler = WakeScheduler::new(host.clone(), tx);

        scheduler.apply(&[wake_in(100, None)]).await;
        assert!(scheduler.tasks.is_empty());
        scheduler.stop().await;
    }
}
