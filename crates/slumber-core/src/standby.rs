//! Standby controller: the single owner of the OS sleep inhibition

use slumber_host_api::{HostResult, PowerHost};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    /// No inhibition held; the OS may sleep on its own schedule.
    Idle,
    /// The per-tick hold: sleep inhibited without a policy reason while a
    /// tick is being evaluated.
    Holding,
    /// A policy suspension with its reason.
    Inhibited { reason: String },
}

/// Serializes all sleep-inhibition traffic to the host.
///
/// Nothing else in the process may call the host's inhibit/allow
/// primitives; going through the controller guarantees at most one
/// inhibition exists and that its reason matches the latest tick outcome.
pub struct StandbyController {
    host: Arc<dyn PowerHost>,
    state: Mutex<State>,
}

impl StandbyController {
    pub fn new(host: Arc<dyn PowerHost>) -> Self {
        Self {
            host,
            state: Mutex::new(State::Idle),
        }
    }

    /// Take the temporary hold for the duration of a tick, so the machine
    /// cannot sleep out from under the checks. No-op when a policy
    /// suspension is already in place.
    pub async fn begin_tick(&self) -> HostResult<()> {
        let mut state = self.state.lock().await;
        if matches!(*state, State::Idle) {
            self.host.inhibit_sleep(None).await?;
            *state = State::Holding;
        }
        Ok(())
    }

    /// Settle the tick outcome: a reason keeps (or re-labels) the
    /// inhibition, no reason releases it.
    pub async fn apply(&self, reason: Option<&str>) -> HostResult<()> {
        let mut state = self.state.lock().await;
        match reason {
            Some(reason) => {
                if let State::Inhibited { reason: current } = &*state {
                    if current == reason {
                        debug!(reason = reason, "Suspension unchanged");
                        return Ok(());
                    }
                }
                match self.host.inhibit_sleep(Some(reason)).await {
                    Ok(()) => {
                        info!(reason = reason, "Sleep suspended");
                        *state = State::Inhibited {
                            reason: reason.to_string(),
                        };
                        Ok(())
                    }
                    Err(e) => {
                        // Roll back to a state we can trust; the next tick
                        // will try again.
                        warn!(error = %e, "Inhibition failed, releasing");
                        let _ = self.host.allow_sleep().await;
                        *state = State::Idle;
                        Err(e)
                    }
                }
            }
            None => {
                if !matches!(*state, State::Idle) {
                    self.host.allow_sleep().await?;
                    if matches!(*state, State::Inhibited { .. }) {
                        info!("Sleep allowed again");
                    }
                    *state = State::Idle;
                }
                Ok(())
            }
        }
    }

    /// Unconditionally release, used on shutdown and pause.
    pub async fn release(&self) -> HostResult<()> {
        self.apply(None).await
    }

    pub async fn is_inhibited(&self) -> bool {
        matches!(*self.state.lock().await, State::Inhibited { .. })
    }

    pub async fn current_reason(&self) -> Option<String> {
        match &*self.state.lock().await {
            State::Inhibited { reason } => Some(reason.clone()),
            _ => None,
        }
    }
}
