//! Executable plugin protocol

use crate::{PluginError, PluginManifest, PluginResult};
use async_trait::async_trait;
use slumber_api::Verdict;
use slumber_util::PluginGuid;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::process::Command;

/// Default per-phase timeout; a hung plugin must not stall the tick
pub const DEFAULT_PHASE_TIMEOUT: Duration = Duration::from_secs(10);

/// One loaded policy plugin
#[async_trait]
pub trait PolicyPlugin: Send + Sync {
    fn guid(&self) -> PluginGuid;

    fn name(&self) -> &str;

    fn is_initialized(&self) -> bool;

    fn is_prepared(&self) -> bool;

    /// One-time setup, before the first tick this plugin takes part in.
    async fn initialize(&self) -> PluginResult<()>;

    /// Called before `check` on every tick.
    async fn prepare(&self) -> PluginResult<()>;

    /// The actual policy question.
    async fn check(&self) -> PluginResult<Verdict>;

    /// Always called after `prepare`, whether `prepare` or `check`
    /// succeeded or not.
    async fn tear_down(&self) -> PluginResult<()>;

    /// Settings-capable plugins restore their state here, right after
    /// initialization.
    async fn load_settings(&self) -> PluginResult<()> {
        Ok(())
    }

    /// Settings-capable plugins persist their state here, at shutdown.
    async fn save_settings(&self) -> PluginResult<()> {
        Ok(())
    }
}

/// Plugin backed by an external executable.
///
/// Each phase is one short-lived child process invocation with the phase
/// name as the single argument. `check` prints a JSON object
/// `{"suspend": bool, "reason": string}` on stdout.
pub struct ExecPlugin {
    guid: PluginGuid,
    name: String,
    executable: PathBuf,
    timeout: Duration,
    initialized: AtomicBool,
    prepared: AtomicBool,
}

impl ExecPlugin {
    pub fn from_manifest(dir: &Path, manifest: &PluginManifest, lang: &str) -> PluginResult<Self> {
        let guid = manifest.parsed_guid()?;
        let executable = dir.join(&manifest.executable);
        if !executable.is_file() {
            return Err(PluginError::ExecutableMissing(
                executable.display().to_string(),
            ));
        }
        Ok(Self {
            guid,
            name: manifest.display_name(lang).to_string(),
            executable,
            timeout: DEFAULT_PHASE_TIMEOUT,
            initialized: AtomicBool::new(false),
            prepared: AtomicBool::new(false),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run_phase(&self, phase: &'static str) -> PluginResult<String> {
        let fut = Command::new(&self.executable)
            .arg(phase)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| PluginError::Timeout {
                plugin: self.name.clone(),
                phase,
            })?
            .map_err(|e| PluginError::LaunchFailed(e.to_string()))?;

        if !output.status.success() {
            return Err(PluginError::PhaseFailed {
                plugin: self.name.clone(),
                phase,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl PolicyPlugin for ExecPlugin {
    fn guid(&self) -> PluginGuid {
        self.guid
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn is_prepared(&self) -> bool {
        self.prepared.load(Ordering::SeqCst)
    }

    async fn initialize(&self) -> PluginResult<()> {
        self.run_phase("initialize").await?;
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn prepare(&self) -> PluginResult<()> {
        self.run_phase("prepare").await?;
        self.prepared.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn check(&self) -> PluginResult<Verdict> {
        let stdout = self.run_phase("check").await?;
        serde_json::from_str(stdout.trim()).map_err(|e| PluginError::BadVerdict {
            plugin: self.name.clone(),
            message: e.to_string(),
        })
    }

    async fn tear_down(&self) -> PluginResult<()> {
        let result = self.run_phase("tear-down").await.map(|_| ());
        self.prepared.store(false, Ordering::SeqCst);
        result
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    /// Write an executable shell script acting as a plugin
    pub fn write_plugin(dir: &Path, guid: &str, name: &str, check_body: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(
            dir.join("manifest.toml"),
            format!(
                "guid = \"{}\"\nexecutable = \"plugin.sh\"\n\n[name]\nen = \"{}\"\n",
                guid, name
            ),
        )
        .unwrap();

        let script = format!(
            "#!/bin/sh\ncase \"$1\" in\n  check) {} ;;\n  *) : ;;\nesac\n",
            check_body
        );
        let path = dir.join("plugin.sh");
        std::fs::write(&path, script).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
    }

    /// Like `write_plugin`, but the script also appends each phase name to
    /// `log`, one per line, so tests can assert the lifecycle order.
    pub fn write_logging_plugin(dir: &Path, guid: &str, name: &str, log: &Path, check_body: &str) {
        write_plugin(dir, guid, name, check_body);
        let script = format!(
            "#!/bin/sh\necho \"$1\" >> {}\ncase \"$1\" in\n  check) {} ;;\n  *) : ;;\nesac\n",
            log.display(),
            check_body
        );
        let path = dir.join("plugin.sh");
        std::fs::write(&path, script).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
    }
}
