//! Plugin discovery and per-tick evaluation

use crate::{ExecPlugin, PluginManifest, PolicyPlugin};
use slumber_api::Verdict;
use slumber_util::PluginGuid;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// The set of loaded, activated plugins, in a stable evaluation order.
pub struct PluginRegistry {
    plugins: Vec<Box<dyn PolicyPlugin>>,
}

impl PluginRegistry {
    pub fn empty() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    /// Scan the plugin root and load every activated plugin.
    ///
    /// Each immediate subdirectory is one load unit. A broken unit (missing
    /// or invalid manifest, bad GUID, missing executable) is logged and
    /// skipped. A GUID seen twice keeps its first directory.
    pub fn load(plugin_dir: &Path, active: &HashSet<PluginGuid>, lang: &str) -> Self {
        let mut registry = Self::empty();
        let mut seen = HashSet::new();

        let mut dirs: Vec<_> = match std::fs::read_dir(plugin_dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect(),
            Err(e) => {
                debug!(dir = %plugin_dir.display(), error = %e, "Plugin directory not readable");
                return registry;
            }
        };
        dirs.sort();

        for dir in dirs {
            let manifest = match PluginManifest::load(&dir) {
                Ok(m) => m,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Skipping plugin: bad manifest");
                    continue;
                }
            };
            let guid = match manifest.parsed_guid() {
                Ok(g) => g,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Skipping plugin: bad GUID");
                    continue;
                }
            };
            if !seen.insert(guid) {
                warn!(dir = %dir.display(), guid = %guid, "Skipping plugin: duplicate GUID");
                continue;
            }
            if !active.contains(&guid) {
                debug!(guid = %guid, "Plugin present but not activated");
                continue;
            }
            match ExecPlugin::from_manifest(&dir, &manifest, lang) {
                Ok(plugin) => {
                    info!(guid = %guid, name = plugin.name(), "Loaded plugin");
                    registry.plugins.push(Box::new(plugin));
                }
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Skipping plugin: load failed");
                }
            }
        }

        registry
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.iter().map(|p| p.name())
    }

    /// Give settings-capable plugins a chance to persist their state.
    pub async fn shutdown(&self) {
        for plugin in &self.plugins {
            if !plugin.is_initialized() {
                continue;
            }
            if let Err(e) = plugin.save_settings().await {
                warn!(plugin = plugin.name(), error = %e, "Plugin settings save failed");
            }
        }
    }

    /// Run one tick of plugin policy: for each plugin in order, prepare,
    /// check, tear down. Teardown runs whether prepare and check succeeded
    /// or not. Evaluation stops at the first suspending verdict; a failing
    /// plugin abstains.
    pub async fn evaluate(&self) -> Option<Verdict> {
        for plugin in &self.plugins {
            let verdict = self.evaluate_one(plugin.as_ref()).await;
            if let Some(v) = verdict {
                if v.suspend {
                    return Some(v.attributed_to(plugin.name()));
                }
            }
        }
        None
    }

    async fn evaluate_one(&self, plugin: &dyn PolicyPlugin) -> Option<Verdict> {
        // Init-once, retried on the next tick if it fails.
        if !plugin.is_initialized() {
            if let Err(e) = plugin.initialize().await {
                warn!(plugin = plugin.name(), error = %e, "Plugin initialization failed");
                return None;
            }
            if let Err(e) = plugin.load_settings().await {
                warn!(plugin = plugin.name(), error = %e, "Plugin settings load failed");
            }
        }

        let verdict = match plugin.prepare().await {
            Ok(()) => match plugin.check().await {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(plugin = plugin.name(), error = %e, "Plugin check failed");
                    None
                }
            },
            Err(e) => {
                warn!(plugin = plugin.name(), error = %e, "Plugin prepare failed");
                None
            }
        };

        if let Err(e) = plugin.tear_down().await {
            warn!(plugin = plugin.name(), error = %e, "Plugin teardown failed");
        }

        verdict
    }
}
