//! slumberd - unattended power management agent
//!
//! Wires together:
//! - Configuration loading and live reload
//! - The policy engine and its monitoring tick
//! - The wake scheduler
//! - The remote shutdown listener
//! - The Linux power host

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::Parser;
use notify::{RecursiveMode, Watcher};
use slumber_api::{PowerAction, PowerEvent};
use slumber_config::{load_settings, Settings};
use slumber_core::{Engine, WakeScheduler};
use slumber_core::remote::{RemoteListener, SysfsMacSource};
use slumber_host_linux::LinuxPowerHost;
use slumber_util::Schedule;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// How often the wall clock is compared against the monotonic timers.
const CLOCK_WATCH_INTERVAL: Duration = Duration::from_secs(30);

/// A wall-clock gap this much beyond the watch cadence means the machine
/// slept in between; we treat it as a resume notification.
const RESUME_DETECT_SLACK: Duration = Duration::from_secs(60);

/// slumberd - keeps an unattended machine awake exactly as long as needed
#[derive(Parser, Debug)]
#[command(name = "slumberd")]
#[command(about = "Unattended power management agent", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/slumberd/config.toml")]
    config: PathBuf,

    /// Plugin directory override (or set SLUMBERD_PLUGIN_DIR env var)
    #[arg(short, long, env = "SLUMBERD_PLUGIN_DIR")]
    plugin_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,
}

struct Service {
    args: Args,
    settings: Settings,
    host: Arc<LinuxPowerHost>,
}

impl Service {
    fn new(args: Args) -> Result<Self> {
        let mut settings = load_settings(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;
        if let Some(dir) = &args.plugin_dir {
            settings.daemon.plugin_dir = dir.clone();
        }

        info!(
            config_path = %args.config.display(),
            wake_schedules = settings.wake_schedules.len(),
            uptime_schedules = settings.uptime_schedules.len(),
            "Configuration loaded"
        );

        install_crash_hook(&settings.daemon.log_dir);

        let host = Arc::new(LinuxPowerHost::probed());
        Ok(Self {
            args,
            settings,
            host,
        })
    }

    fn reload_settings(&mut self) -> Result<()> {
        let mut settings = load_settings(&self.args.config)
            .with_context(|| format!("Failed to reload config from {:?}", self.args.config))?;
        if let Some(dir) = &self.args.plugin_dir {
            settings.daemon.plugin_dir = dir.clone();
        }
        self.settings = settings;
        Ok(())
    }

    fn schedules(&self) -> Vec<Schedule> {
        self.settings
            .wake_schedules
            .iter()
            .cloned()
            .map(Schedule::Wake)
            .chain(
                self.settings
                    .uptime_schedules
                    .iter()
                    .cloned()
                    .map(Schedule::Uptime),
            )
            .collect()
    }

    async fn run(mut self) -> Result<()> {
        let mut engine = Engine::new(self.settings.clone(), self.host.clone());

        let (wake_tx, mut wake_events) = mpsc::unbounded_channel();
        let mut scheduler = WakeScheduler::new(self.host.clone(), wake_tx);
        scheduler.apply(&self.schedules()).await;

        let (remote_tx, mut remote_actions) = mpsc::unbounded_channel();
        let (listener_cancel, _) = watch::channel(false);
        spawn_listener(&self.settings, remote_tx.clone(), &listener_cancel).await;

        let (watch_tx, mut watch_events) = mpsc::unbounded_channel();
        let _watcher = watch_files(
            &self.args.config,
            &self.settings.daemon.uptime_marker,
            watch_tx,
        )?;

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;
        let mut sigusr1 =
            signal(SignalKind::user_defined1()).context("Failed to create SIGUSR1 handler")?;
        let mut sigusr2 =
            signal(SignalKind::user_defined2()).context("Failed to create SIGUSR2 handler")?;

        let mut tick_timer = tokio::time::interval(engine.monitoring_interval());
        tick_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // Monotonic timers pause in standby, so neither tokio's intervals
        // nor Instant can notice a resume; the wall clock can.
        let mut clock_watch = tokio::time::interval(CLOCK_WATCH_INTERVAL);
        clock_watch.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_seen = Local::now();

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down");
                    break;
                }

                _ = sighup.recv() => {
                    info!("Received SIGHUP, reloading configuration");
                    match self.reload_settings() {
                        Ok(()) => {
                            engine = Engine::new(self.settings.clone(), self.host.clone());
                            scheduler.apply(&self.schedules()).await;
                            tick_timer = tokio::time::interval(engine.monitoring_interval());
                            tick_timer
                                .set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                        }
                        Err(e) => {
                            // Keep running with the previous settings.
                            error!(error = %e, "Reload failed, keeping current configuration");
                        }
                    }
                }

                _ = sigusr1.recv() => {
                    // Pause: stop evaluating and disarm wake timers, but
                    // keep the settings loaded.
                    info!("Received SIGUSR1, pausing monitoring");
                    scheduler.stop().await;
                    if let Err(e) = engine.pause().await {
                        warn!(error = %e, "Pause failed");
                    }
                }
                _ = sigusr2.recv() => {
                    // Continue: reload settings and re-arm everything.
                    info!("Received SIGUSR2, resuming monitoring");
                    if let Err(e) = self.reload_settings() {
                        error!(error = %e, "Reload failed, keeping current configuration");
                    }
                    engine = Engine::new(self.settings.clone(), self.host.clone());
                    scheduler.apply(&self.schedules()).await;
                    tick_timer = tokio::time::interval(engine.monitoring_interval());
                    tick_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                }

                _ = tick_timer.tick() => {
                    if let Err(e) = engine.tick().await {
                        warn!(error = %e, "Tick failed");
                    }
                }

                _ = clock_watch.tick() => {
                    let now = Local::now();
                    if wall_gap_indicates_resume(last_seen, now, CLOCK_WATCH_INTERVAL, RESUME_DETECT_SLACK) {
                        debug!(gap_secs = (now - last_seen).num_seconds(), "Detected wall-clock gap");
                        engine.on_power_event(PowerEvent::Resume);
                    }
                    last_seen = now;
                }

                Some(event) = wake_events.recv() => {
                    engine.on_wake_event(&event);
                }

                Some(action) = remote_actions.recv() => {
                    handle_remote(&mut engine, action).await;
                }

                Some(signal) = watch_events.recv() => match signal {
                    WatchSignal::Config => {
                        info!("Configuration file changed, reloading");
                        match self.reload_settings() {
                            Ok(()) => {
                                engine = Engine::new(self.settings.clone(), self.host.clone());
                                scheduler.apply(&self.schedules()).await;
                            }
                            Err(e) => {
                                error!(error = %e, "Reload failed, keeping current configuration");
                            }
                        }
                    }
                    WatchSignal::UptimeMarker => {
                        // Reinterpret the override immediately rather than
                        // waiting out the monitoring interval.
                        info!("Uptime marker changed, re-evaluating");
                        if let Err(e) = engine.tick().await {
                            warn!(error = %e, "Tick failed");
                        }
                    }
                }
            }
        }

        info!("Shutting down slumberd");
        let _ = listener_cancel.send(true);
        scheduler.stop().await;
        if let Err(e) = engine.shutdown().await {
            warn!(error = %e, "Failed to release inhibition on shutdown");
        }
        info!("Shutdown complete");
        Ok(())
    }
}

async fn handle_remote(engine: &mut Engine, action: PowerAction) {
    if action.is_terminal() {
        info!(action = %action, "Remote command ends this session");
    }
    if let Err(e) = engine.perform_remote(action).await {
        error!(action = %action, error = %e, "Remote power action failed");
    }
}

async fn spawn_listener(
    settings: &Settings,
    actions_tx: mpsc::UnboundedSender<PowerAction>,
    cancel: &watch::Sender<bool>,
) {
    if !settings.remote.enabled {
        return;
    }
    match RemoteListener::bind(
        settings.remote.port,
        &SysfsMacSource,
        settings.remote.password.clone(),
        actions_tx,
    )
    .await
    {
        Ok(listener) => {
            tokio::spawn(listener.run(cancel.subscribe()));
        }
        Err(e) => {
            error!(port = settings.remote.port, error = %e, "Remote listener failed to bind");
        }
    }
}

enum WatchSignal {
    Config,
    UptimeMarker,
}

/// Watch the configuration file and the temporary-uptime marker.
///
/// The watcher must outlive the event loop, so the caller holds on to it.
fn watch_files(
    config_path: &Path,
    marker_path: &Path,
    tx: mpsc::UnboundedSender<WatchSignal>,
) -> Result<notify::RecommendedWatcher> {
    let config = config_path.to_path_buf();
    let marker = marker_path.to_path_buf();

    let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
        match result {
            Ok(event) => {
                // Marker removal matters too: a deleted marker ends the
                // temporary-uptime override.
                if !(event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove()) {
                    return;
                }
                if event.paths.iter().any(|p| p == &config) {
                    let _ = tx.send(WatchSignal::Config);
                } else if event.paths.iter().any(|p| p == &marker) {
                    let _ = tx.send(WatchSignal::UptimeMarker);
                }
            }
            Err(e) => warn!(error = %e, "File watcher error"),
        }
    })
    .context("Failed to create file watcher")?;

    // Watch the parents so editors that replace the files are seen too.
    let config_dir = parent_or_cwd(config_path);
    watcher
        .watch(config_dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {:?}", config_dir))?;

    // The marker's directory may not exist yet; its watch is best-effort.
    let marker_dir = parent_or_cwd(marker_path);
    if marker_dir != config_dir {
        if let Err(e) = watcher.watch(marker_dir, RecursiveMode::NonRecursive) {
            debug!(dir = ?marker_dir, error = %e, "Not watching uptime marker directory");
        }
    }

    Ok(watcher)
}

fn parent_or_cwd(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// True if the wall clock advanced far beyond the watch cadence since the
/// last observation. A backwards step (NTP correction) is not a resume.
fn wall_gap_indicates_resume(
    last_seen: DateTime<Local>,
    now: DateTime<Local>,
    cadence: Duration,
    slack: Duration,
) -> bool {
    let gap = (now - last_seen).to_std().unwrap_or(Duration::ZERO);
    gap > cadence + slack
}

/// Write panics to a crash report file before the process dies, since an
/// unattended machine has nobody watching stderr.
fn install_crash_hook(log_dir: &Path) {
    let log_dir = log_dir.to_path_buf();
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let report = format!(
            "slumberd {} crashed at {}\n\n{}\n\nbacktrace:\n{}\n",
            env!("CARGO_PKG_VERSION"),
            chrono::Local::now().to_rfc3339(),
            info,
            std::backtrace::Backtrace::force_capture()
        );
        let path = log_dir.join(format!(
            "crash-{}.log",
            chrono::Local::now().format("%Y%m%d-%H%M%S")
        ));
        let _ = std::fs::create_dir_all(&log_dir);
        let _ = std::fs::write(&path, report);
        default_hook(info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "slumberd starting");

    if args.check_config {
        let settings = load_settings(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;
        println!(
            "Configuration OK: {} wake schedule(s), {} uptime schedule(s)",
            settings.wake_schedules.len(),
            settings.uptime_schedules.len()
        );
        return Ok(());
    }

    let service = Service::new(args)?;
    service.run().await
}
