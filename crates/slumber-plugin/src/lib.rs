//! Policy plugins for slumberd
//!
//! A plugin is a subdirectory of the plugin root containing a
//! `manifest.toml` and an executable. The agent speaks a small subcommand
//! protocol to the executable (`prepare`, `check`, `tear-down`); `check`
//! prints a JSON verdict on stdout.
//!
//! Loading is isolated: a broken plugin is logged and skipped, never fatal.

mod exec;
mod manifest;
mod registry;

pub use exec::*;
pub use manifest::*;
pub use registry::*;

use thiserror::Error;

/// Plugin loading and lifecycle errors
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Failed to read manifest: {0}")]
    ManifestRead(#[from] std::io::Error),

    #[error("Failed to parse manifest: {0}")]
    ManifestParse(#[from] toml::de::Error),

    #[error("Invalid plugin GUID '{0}'")]
    InvalidGuid(String),

    #[error("Plugin executable not found: {0}")]
    ExecutableMissing(String),

    #[error("Failed to launch plugin: {0}")]
    LaunchFailed(String),

    #[error("Plugin '{plugin}' {phase} failed: {message}")]
    PhaseFailed {
        plugin: String,
        phase: &'static str,
        message: String,
    },

    #[error("Plugin '{plugin}' produced invalid verdict: {message}")]
    BadVerdict { plugin: String, message: String },

    #[error("Plugin '{plugin}' timed out during {phase}")]
    Timeout { plugin: String, phase: &'static str },
}

pub type PluginResult<T> = Result<T, PluginError>;
