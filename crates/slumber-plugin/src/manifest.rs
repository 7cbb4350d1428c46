//! Plugin manifests

use crate::{PluginError, PluginResult};
use serde::{Deserialize, Serialize};
use slumber_util::PluginGuid;
use std::collections::BTreeMap;
use std::path::Path;

/// Parsed `manifest.toml` of one plugin directory
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginManifest {
    /// Stable identity; duplicates across directories are rejected
    pub guid: String,

    /// Executable file name, relative to the plugin directory
    pub executable: String,

    /// Display name per language code
    #[serde(default)]
    pub name: BTreeMap<String, String>,

    /// Description per language code
    #[serde(default)]
    pub description: BTreeMap<String, String>,

    /// Author per language code
    #[serde(default)]
    pub author: BTreeMap<String, String>,
}

impl PluginManifest {
    pub fn load(dir: &Path) -> PluginResult<Self> {
        let content = std::fs::read_to_string(dir.join("manifest.toml"))?;
        let manifest: Self = toml::from_str(&content)?;
        Ok(manifest)
    }

    pub fn parsed_guid(&self) -> PluginResult<PluginGuid> {
        PluginGuid::parse(&self.guid).map_err(|_| PluginError::InvalidGuid(self.guid.clone()))
    }

    /// Display name in the requested language, falling back to English and
    /// then to any available entry.
    pub fn display_name(&self, lang: &str) -> &str {
        localized(&self.name, lang).unwrap_or("(unnamed plugin)")
    }

    pub fn display_description(&self, lang: &str) -> Option<&str> {
        localized(&self.description, lang)
    }

    pub fn display_author(&self, lang: &str) -> Option<&str> {
        localized(&self.author, lang)
    }
}

fn localized<'a>(map: &'a BTreeMap<String, String>, lang: &str) -> Option<&'a str> {
    map.get(lang)
        .or_else(|| map.get("en"))
        .or_else(|| map.values().next())
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(toml_str: &str) -> PluginManifest {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn localization_fallback_chain() {
        let m = manifest(
            r#"
            guid = "6f2c4b4e-9a1d-4f3a-8c2e-0b5d7e6a1c9f"
            executable = "dlna-monitor"

            [name]
            en = "DLNA Monitor"
            de = "DLNA-Wächter"
        "#,
        );

        assert_eq!(m.display_name("de"), "DLNA-Wächter");
        assert_eq!(m.display_name("fr"), "DLNA Monitor");
    }

    #[test]
    fn first_entry_when_no_english() {
        let m = manifest(
            r#"
            guid = "6f2c4b4e-9a1d-4f3a-8c2e-0b5d7e6a1c9f"
            executable = "dlna-monitor"

            [name]
            de = "DLNA-Wächter"
        "#,
        );

        assert_eq!(m.display_name("fr"), "DLNA-Wächter");
    }

    #[test]
    fn empty_name_map() {
        let m = manifest(
            r#"
            guid = "6f2c4b4e-9a1d-4f3a-8c2e-0b5d7e6a1c9f"
            executable = "dlna-monitor"
        "#,
        );

        assert_eq!(m.display_name("en"), "(unnamed plugin)");
        assert!(m.display_description("en").is_none());
    }

    #[test]
    fn bad_guid_rejected() {
        let m = manifest(
            r#"
            guid = "nope"
            executable = "x"
        "#,
        );
        assert!(matches!(
            m.parsed_guid(),
            Err(PluginError::InvalidGuid(_))
        ));
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("manifest.toml"),
            r#"
            guid = "6f2c4b4e-9a1d-4f3a-8c2e-0b5d7e6a1c9f"
            executable = "check"

            [name]
            en = "Test Plugin"
        "#,
        )
        .unwrap();

        let m = PluginManifest::load(dir.path()).unwrap();
        assert_eq!(m.executable, "check");
        assert_eq!(m.display_name("en"), "Test Plugin");
    }
}
