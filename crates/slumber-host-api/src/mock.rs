//! Mock power host for testing

use async_trait::async_trait;
use chrono::{DateTime, Local};
use slumber_api::PowerAction;
use std::sync::{Arc, Mutex};

use crate::{HostCapabilities, HostError, HostResult, PowerHost};

/// One recorded host operation
#[derive(Debug, Clone, PartialEq)]
pub enum HostOp {
    Inhibit { reason: Option<String> },
    Allow,
    CreateWakeTimer { at: DateTime<Local> },
    CancelWakeTimer,
    Action(PowerAction),
}

/// Mock power host recording every operation for assertions
pub struct MockPowerHost {
    capabilities: HostCapabilities,
    ops: Arc<Mutex<Vec<HostOp>>>,

    /// Configure inhibit_sleep to fail
    pub fail_inhibit: Arc<Mutex<bool>>,

    /// Configure power actions to fail
    pub fail_actions: Arc<Mutex<bool>>,
}

impl MockPowerHost {
    pub fn new() -> Self {
        Self {
            capabilities: HostCapabilities::preferred(),
            ops: Arc::new(Mutex::new(Vec::new())),
            fail_inhibit: Arc::new(Mutex::new(false)),
            fail_actions: Arc::new(Mutex::new(false)),
        }
    }

    pub fn with_capabilities(mut self, caps: HostCapabilities) -> Self {
        self.capabilities = caps;
        self
    }

    /// Snapshot of the recorded operation log
    pub fn ops(&self) -> Vec<HostOp> {
        self.ops.lock().unwrap().clone()
    }

    /// Inhibitions that carried a reason (i.e. real policy suspensions,
    /// not the per-tick temporary hold)
    pub fn inhibits_with_reason(&self) -> usize {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter(|op| matches!(op, HostOp::Inhibit { reason: Some(_) }))
            .count()
    }

    pub fn allow_calls(&self) -> usize {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter(|op| matches!(op, HostOp::Allow))
            .count()
    }

    pub fn actions(&self) -> Vec<PowerAction> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter_map(|op| match op {
                HostOp::Action(a) => Some(*a),
                _ => None,
            })
            .collect()
    }

    fn record(&self, op: HostOp) {
        self.ops.lock().unwrap().push(op);
    }

    async fn action(&self, action: PowerAction) -> HostResult<()> {
        if *self.fail_actions.lock().unwrap() {
            return Err(HostError::ActionFailed {
                action,
                message: "mock action failure".into(),
            });
        }
        self.record(HostOp::Action(action));
        Ok(())
    }
}

impl Default for MockPowerHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PowerHost for MockPowerHost {
    fn capabilities(&self) -> &HostCapabilities {
        &self.capabilities
    }

    async fn inhibit_sleep(&self, reason: Option<&str>) -> HostResult<()> {
        if *self.fail_inhibit.lock().unwrap() {
            return Err(HostError::InhibitFailed("mock inhibit failure".into()));
        }
        self.record(HostOp::Inhibit {
            reason: reason.map(|r| r.to_string()),
        });
        Ok(())
    }

    async fn allow_sleep(&self) -> HostResult<()> {
        self.record(HostOp::Allow);
        Ok(())
    }

    fn query_wake_timers_allowed(&self) -> bool {
        self.capabilities.wake_timers
    }

    async fn create_wake_timer(&self, at: DateTime<Local>) -> HostResult<()> {
        self.record(HostOp::CreateWakeTimer { at });
        Ok(())
    }

    async fn cancel_wake_timer(&self) -> HostResult<()> {
        self.record(HostOp::CancelWakeTimer);
        Ok(())
    }

    async fn suspend_now(&self) -> HostResult<()> {
        self.action(PowerAction::Standby).await
    }

    async fn hibernate_now(&self) -> HostResult<()> {
        self.action(PowerAction::Hibernate).await
    }

    async fn shutdown_now(&self) -> HostResult<()> {
        self.action(PowerAction::Shutdown).await
    }

    async fn restart_now(&self) -> HostResult<()> {
        self.action(PowerAction::Restart).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_operations_in_order() {
        let host = MockPowerHost::new();

        host.inhibit_sleep(None).await.unwrap();
        host.inhibit_sleep(Some("backup running")).await.unwrap();
        host.allow_sleep().await.unwrap();
        host.perform(PowerAction::Standby).await.unwrap();

        let ops = host.ops();
        assert_eq!(ops.len(), 4);
        assert_eq!(ops[0], HostOp::Inhibit { reason: None });
        assert_eq!(
            ops[1],
            HostOp::Inhibit {
                reason: Some("backup running".into())
            }
        );
        assert_eq!(host.inhibits_with_reason(), 1);
        assert_eq!(host.allow_calls(), 1);
        assert_eq!(host.actions(), vec![PowerAction::Standby]);
    }

    #[tokio::test]
    async fn inhibit_failure_injection() {
        let host = MockPowerHost::new();
        *host.fail_inhibit.lock().unwrap() = true;

        let result = host.inhibit_sleep(Some("x")).await;
        assert!(matches!(result, Err(HostError::InhibitFailed(_))));
        assert!(host.ops().is_empty());
    }
}
