//! External command execution: tick outcome actions and wake side effects

use slumber_config::WakeActionSettings;
use tokio::process::Command;
use tracing::{info, warn};

/// Run each configured argv in order. Failures are logged, never fatal;
/// a broken action command must not take the policy engine down.
pub async fn run_commands(commands: &[Vec<String>], context: &'static str) {
    for argv in commands {
        let Some((program, args)) = argv.split_first() else {
            continue;
        };
        match Command::new(program).args(args).status().await {
            Ok(status) if status.success() => {
                info!(command = %argv.join(" "), context, "Action command succeeded");
            }
            Ok(status) => {
                warn!(command = %argv.join(" "), context, %status, "Action command failed");
            }
            Err(e) => {
                warn!(command = %argv.join(" "), context, error = %e, "Action command did not start");
            }
        }
    }
}

/// Side effects after a resume from standby: give the hardware a settle
/// delay, then restart services, launch programs and bounce network
/// interfaces whose drivers came back wedged.
pub async fn run_wake_actions(settings: WakeActionSettings) {
    tokio::time::sleep(settings.settle_delay).await;

    for service in &settings.restart_services {
        let argv = vec![
            "systemctl".to_string(),
            "restart".to_string(),
            service.clone(),
        ];
        run_commands(&[argv], "wake-restart-service").await;
    }

    run_commands(&settings.start_programs, "wake-start-program").await;

    for adapter in &settings.reset_network_adapters {
        let down = vec![
            "ip".to_string(),
            "link".to_string(),
            "set".to_string(),
            adapter.clone(),
            "down".to_string(),
        ];
        let up = vec![
            "ip".to_string(),
            "link".to_string(),
            "set".to_string(),
            adapter.clone(),
            "up".to_string(),
        ];
        run_commands(&[down, up], "wake-reset-adapter").await;
    }
}
