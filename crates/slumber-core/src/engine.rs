//! The policy engine: one tick at a time

use slumber_api::{PowerAction, PowerEvent, WakeEvent};
use slumber_config::Settings;
use slumber_host_api::{HostResult, PowerHost};
use slumber_plugin::PluginRegistry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::actions::{run_commands, run_wake_actions};
use crate::checks::{build_checks, PolicyCheck};
use crate::standby::StandbyController;

/// A wake-timer fire within this window before a resume attributes the
/// resume to the schedule
const WAKE_ATTRIBUTION_RECENCY: Duration = Duration::from_secs(60);

/// Margin subtracted from the monitoring interval to size the resume
/// guard: after an attributed wake, sleep is suppressed until the first
/// regular tick has had a chance to run
const RESUME_GUARD_MARGIN: Duration = Duration::from_secs(30);

/// The outcome of one tick's evaluation
struct TickOutcome {
    reason: String,
    /// Scheduled-uptime suspensions do not fire the policy action commands.
    uptime_window: bool,
}

/// Drives the policy checks and owns the resulting inhibition.
///
/// One tick: take the temporary hold, ask every check in order until one
/// objects (then the plugins), settle the inhibition to match, fire the
/// configured action commands.
pub struct Engine {
    settings: Settings,
    controller: StandbyController,
    host: Arc<dyn PowerHost>,
    checks: Vec<Box<dyn PolicyCheck>>,
    plugins: PluginRegistry,
    paused: bool,
    resume_guard_until: Option<Instant>,
    last_wake_fire: Option<Instant>,
    last_resume: Option<Instant>,
}

impl Engine {
    pub fn new(settings: Settings, host: Arc<dyn PowerHost>) -> Self {
        let checks = build_checks(&settings);
        let plugins = PluginRegistry::load(
            &settings.daemon.plugin_dir,
            &settings.active_plugins,
            "en",
        );
        Self::assemble(settings, host, checks, plugins)
    }

    /// Test seam: inject checks and plugins directly.
    pub fn with_parts(
        settings: Settings,
        host: Arc<dyn PowerHost>,
        checks: Vec<Box<dyn PolicyCheck>>,
        plugins: PluginRegistry,
    ) -> Self {
        Self::assemble(settings, host, checks, plugins)
    }

    fn assemble(
        settings: Settings,
        host: Arc<dyn PowerHost>,
        checks: Vec<Box<dyn PolicyCheck>>,
        plugins: PluginRegistry,
    ) -> Self {
        Self {
            settings,
            controller: StandbyController::new(host.clone()),
            host,
            checks,
            plugins,
            paused: false,
            resume_guard_until: None,
            last_wake_fire: None,
            last_resume: None,
        }
    }

    pub fn monitoring_interval(&self) -> Duration {
        self.settings.daemon.monitoring_interval
    }

    /// Run one monitoring tick.
    pub async fn tick(&mut self) -> HostResult<()> {
        if self.paused {
            debug!("Monitoring paused, skipping tick");
            return Ok(());
        }

        // Hold sleep while we evaluate, so a nearly-idle machine cannot
        // doze off between two checks.
        self.controller.begin_tick().await?;

        let outcome = self.evaluate().await;
        match outcome {
            Some(outcome) => {
                info!(reason = %outcome.reason, "Policy satisfied, staying awake");
                let result = self.controller.apply(Some(&outcome.reason)).await;
                if !outcome.uptime_window {
                    run_commands(
                        &self.settings.actions.on_policy_satisfied,
                        "policy-satisfied",
                    )
                    .await;
                }
                result
            }
            None => {
                debug!("No policy objects to sleeping");
                run_commands(&self.settings.actions.on_no_policy, "no-policy").await;
                self.controller.apply(None).await
            }
        }
    }

    async fn evaluate(&mut self) -> Option<TickOutcome> {
        if let Some(guard_until) = self.resume_guard_until {
            if Instant::now() < guard_until {
                return Some(TickOutcome {
                    reason: "Recently woken for a schedule".into(),
                    uptime_window: true,
                });
            }
            self.resume_guard_until = None;
        }

        for check in &mut self.checks {
            match check.check().await {
                Ok(verdict) if verdict.suspend => {
                    debug!(check = check.name(), reason = %verdict.reason, "Check objects");
                    return Some(TickOutcome {
                        reason: verdict.reason,
                        uptime_window: check.is_uptime_window(),
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    // A failing check abstains for this tick only.
                    warn!(check = check.name(), error = %e, "Check failed, abstaining");
                }
            }
        }

        self.plugins.evaluate().await.map(|verdict| TickOutcome {
            reason: verdict.reason,
            uptime_window: false,
        })
    }

    /// A wake timer fired; remember it so a nearby resume can be
    /// attributed to the schedule.
    pub fn on_wake_event(&mut self, event: &WakeEvent) {
        match event {
            WakeEvent::Completed { schedule_id, due } => {
                info!(schedule = %schedule_id, due = %due, "Wake timer completed");
                self.last_wake_fire = Some(Instant::now());
                // The timer task reports the fire from a sliced sleep, so
                // it can arrive after the resume was already noticed;
                // attribution works from either direction.
                if self.recently(self.last_resume) {
                    self.arm_resume_guard();
                }
            }
            WakeEvent::Cancelled { schedule_id } => {
                debug!(schedule = %schedule_id, "Wake timer cancelled");
            }
        }
    }

    fn recently(&self, at: Option<Instant>) -> bool {
        at.map(|t| t.elapsed() < WAKE_ATTRIBUTION_RECENCY)
            .unwrap_or(false)
    }

    fn arm_resume_guard(&mut self) {
        let guard = self
            .settings
            .daemon
            .monitoring_interval
            .saturating_sub(RESUME_GUARD_MARGIN);
        info!(guard_secs = guard.as_secs(), "Resumed for a schedule");
        self.resume_guard_until = Some(Instant::now() + guard);
    }

    /// React to OS power notifications.
    pub fn on_power_event(&mut self, event: PowerEvent) {
        match event {
            PowerEvent::Suspend => {
                info!("Entering standby");
            }
            PowerEvent::Resume => {
                self.last_resume = Some(Instant::now());
                if self.recently(self.last_wake_fire) {
                    self.arm_resume_guard();
                } else {
                    info!("Resumed from standby");
                }

                tokio::spawn(run_wake_actions(self.settings.wake_actions.clone()));
            }
        }
    }

    /// Perform a remotely requested power action. The inhibition is
    /// released first so our own hold cannot block the transition.
    pub async fn perform_remote(&mut self, action: PowerAction) -> HostResult<()> {
        info!(action = %action, "Performing remote power command");
        self.controller.release().await?;
        self.host.perform(action).await
    }

    /// Stop evaluating and release any held inhibition.
    pub async fn pause(&mut self) -> HostResult<()> {
        self.paused = true;
        self.controller.release().await
    }

    /// Resume evaluating; the next tick re-establishes the inhibition if a
    /// policy still applies.
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Final cleanup before the process exits.
    pub async fn shutdown(&mut self) -> HostResult<()> {
        self.plugins.shutdown().await;
        self.controller.release().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use slumber_api::Verdict;
    use slumber_host_api::{HostOp, MockPowerHost};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::checks::{CheckError, CheckResult};

    struct StaticCheck {
        name: &'static str,
        verdict: Verdict,
        uptime: bool,
        calls: Arc<AtomicUsize>,
    }

    impl StaticCheck {
        fn allow(name: &'static str) -> (Self, Arc<AtomicUsize>) {
            Self::build(name, Verdict::allow(), false)
        }

        fn suspend(name: &'static str, reason: &str) -> (Self, Arc<AtomicUsize>) {
            Self::build(name, Verdict::suspend(reason), false)
        }

        fn uptime(name: &'static str, reason: &str) -> (Self, Arc<AtomicUsize>) {
            Self::build(name, Verdict::suspend(reason), true)
        }

        fn build(
            name: &'static str,
            verdict: Verdict,
            uptime: bool,
        ) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    name,
                    verdict,
                    uptime,
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl PolicyCheck for StaticCheck {
        fn name(&self) -> &'static str {
            self.name
        }

        fn is_uptime_window(&self) -> bool {
            self.uptime
        }

        async fn check(&mut self) -> CheckResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.verdict.clone())
        }
    }

    struct FailingCheck;

    #[async_trait]
    impl PolicyCheck for FailingCheck {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn check(&mut self) -> CheckResult {
            Err(CheckError::CommandFailed {
                command: "probe".into(),
                message: "boom".into(),
            })
        }
    }

    fn engine_with(checks: Vec<Box<dyn PolicyCheck>>) -> (Engine, Arc<MockPowerHost>) {
        let host = Arc::new(MockPowerHost::new());
        let engine = Engine::with_parts(
            Settings::default(),
            host.clone(),
            checks,
            PluginRegistry::empty(),
        );
        (engine, host)
    }

    #[tokio::test]
    async fn six_quiet_ticks_six_releases() {
        let (mut engine, host) = engine_with(vec![]);

        for _ in 0..6 {
            engine.tick().await.unwrap();
        }

        assert_eq!(host.allow_calls(), 6);
        assert_eq!(host.inhibits_with_reason(), 0);
    }

    #[tokio::test]
    async fn first_objection_wins_and_later_checks_skipped() {
        let (first, first_calls) = StaticCheck::allow("first");
        let (second, second_calls) = StaticCheck::suspend("second", "backup running");
        let (third, third_calls) = StaticCheck::allow("third");
        let (mut engine, host) =
            engine_with(vec![Box::new(first), Box::new(second), Box::new(third)]);

        engine.tick().await.unwrap();

        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
        assert_eq!(host.inhibits_with_reason(), 1);
        assert!(host.ops().contains(&HostOp::Inhibit {
            reason: Some("backup running".into())
        }));
    }

    #[tokio::test]
    async fn failing_check_abstains() {
        let (after, after_calls) = StaticCheck::suspend("after", "still here");
        let (mut engine, host) = engine_with(vec![Box::new(FailingCheck), Box::new(after)]);

        engine.tick().await.unwrap();

        assert_eq!(after_calls.load(Ordering::SeqCst), 1);
        assert_eq!(host.inhibits_with_reason(), 1);
    }

    #[tokio::test]
    async fn policy_actions_fire_only_for_workload_suspensions() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("fired");

        let (check, _) = StaticCheck::uptime("window", "scheduled uptime");
        let host = Arc::new(MockPowerHost::new());
        let mut settings = Settings::default();
        settings.actions.on_policy_satisfied =
            vec![vec!["touch".into(), marker.display().to_string()]];
        let mut engine = Engine::with_parts(
            settings,
            host.clone(),
            vec![Box::new(check)],
            PluginRegistry::empty(),
        );

        engine.tick().await.unwrap();
        // Uptime windows suppress the action commands.
        assert!(!marker.exists());
        assert_eq!(host.inhibits_with_reason(), 1);
    }

    #[tokio::test]
    async fn policy_actions_fire_for_workload_suspensions() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("fired");

        let (check, _) = StaticCheck::suspend("busy", "working");
        let host = Arc::new(MockPowerHost::new());
        let mut settings = Settings::default();
        settings.actions.on_policy_satisfied =
            vec![vec!["touch".into(), marker.display().to_string()]];
        let mut engine = Engine::with_parts(
            settings,
            host.clone(),
            vec![Box::new(check)],
            PluginRegistry::empty(),
        );

        engine.tick().await.unwrap();
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn no_policy_actions_fire_when_idle() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("idle");

        let host = Arc::new(MockPowerHost::new());
        let mut settings = Settings::default();
        settings.actions.on_no_policy =
            vec![vec!["touch".into(), marker.display().to_string()]];
        let mut engine =
            Engine::with_parts(settings, host.clone(), vec![], PluginRegistry::empty());

        engine.tick().await.unwrap();
        assert!(marker.exists());
        assert_eq!(host.allow_calls(), 1);
    }

    #[tokio::test]
    async fn resume_guard_after_attributed_wake() {
        let (mut engine, host) = engine_with(vec![]);

        engine.on_wake_event(&WakeEvent::Completed {
            schedule_id: slumber_util::ScheduleId::new("nightly"),
            due: chrono::Local::now(),
        });
        engine.on_power_event(PowerEvent::Resume);

        engine.tick().await.unwrap();
        assert_eq!(host.inhibits_with_reason(), 1);
        assert!(host.ops().iter().any(|op| matches!(
            op,
            HostOp::Inhibit { reason: Some(r) } if r.contains("Recently woken")
        )));
    }

    #[tokio::test]
    async fn resume_guard_when_wake_report_arrives_late() {
        let (mut engine, host) = engine_with(vec![]);

        // The resume is noticed first; the timer task reports the fire
        // a moment later.
        engine.on_power_event(PowerEvent::Resume);
        engine.on_wake_event(&WakeEvent::Completed {
            schedule_id: slumber_util::ScheduleId::new("nightly"),
            due: chrono::Local::now(),
        });

        engine.tick().await.unwrap();
        assert_eq!(host.inhibits_with_reason(), 1);
        assert!(host.ops().iter().any(|op| matches!(
            op,
            HostOp::Inhibit { reason: Some(r) } if r.contains("Recently woken")
        )));
    }

    #[tokio::test]
    async fn unattributed_resume_has_no_guard() {
        let (mut engine, host) = engine_with(vec![]);

        engine.on_power_event(PowerEvent::Resume);

        engine.tick().await.unwrap();
        assert_eq!(host.inhibits_with_reason(), 0);
        assert_eq!(host.allow_calls(), 1);
    }

    #[tokio::test]
    async fn paused_engine_skips_ticks() {
        let (suspending, calls) = StaticCheck::suspend("busy", "working");
        let (mut engine, host) = engine_with(vec![Box::new(suspending)]);

        engine.pause().await.unwrap();
        engine.tick().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        engine.resume();
        engine.tick().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(host.inhibits_with_reason(), 1);
    }

    #[tokio::test]
    async fn remote_action_releases_inhibition_first() {
        let (busy, _) = StaticCheck::suspend("busy", "working");
        let (mut engine, host) = engine_with(vec![Box::new(busy)]);

        engine.tick().await.unwrap();
        assert_eq!(host.inhibits_with_reason(), 1);

        engine.perform_remote(PowerAction::Standby).await.unwrap();

        let ops = host.ops();
        let allow_pos = ops.iter().rposition(|op| matches!(op, HostOp::Allow));
        let action_pos = ops
            .iter()
            .position(|op| matches!(op, HostOp::Action(PowerAction::Standby)));
        assert!(allow_pos.unwrap() < action_pos.unwrap());
    }

    #[tokio::test]
    async fn shutdown_releases_inhibition() {
        let (busy, _) = StaticCheck::suspend("busy", "working");
        let (mut engine, host) = engine_with(vec![Box::new(busy)]);

        engine.tick().await.unwrap();
        engine.shutdown().await.unwrap();
        assert!(matches!(host.ops().last(), Some(HostOp::Allow)));
    }
}
