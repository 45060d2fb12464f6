use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::engine::constants::CURRENT_FORMAT_VERSION;
use crate::engine::error::{Error, Result};
use crate::storage::macros::MacroTable;
use crate::storage::provider::StorageProvider;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigFormat {
    /// JSON format (.json)
    Json,
    /// YAML format (.yaml, .yml) - requires "yaml-config" feature
    #[cfg(feature = "yaml-config")]
    Yaml,
    /// TOML format (.toml) - requires "toml-config" feature
    #[cfg(feature = "toml-config")]
    Toml,
}

impl ConfigFormat {
    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => "yaml",
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => "toml",
        }
    }

    /// Determine format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(ConfigFormat::Json),
                #[cfg(feature = "yaml-config")]
                "yaml" | "yml" => Some(ConfigFormat::Yaml),
                #[cfg(feature = "toml-config")]
                "toml" => Some(ConfigFormat::Toml),
                _ => None,
            })
    }
}

/// Settings that shape how stores read and write their files.
///
/// Every field has a default, so a config file only needs the keys it
/// changes:
///
/// ```toml
/// project_format_version = 4
///
/// [macros]
/// APP_CONFIG = "/home/me/.config/app"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Initial macro table; names may be given with or without `$` delimiters
    pub macros: BTreeMap<String, String>,
    /// Format version stamped into project and module roots
    pub project_format_version: u32,
    /// Copy every owned file aside before a confirmed migration
    pub backup_before_migration: bool,
    /// Line separator used when writing storage files
    pub line_separator: String,
    /// Directory receiving migration backups; defaults to beside each file
    pub backup_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            macros: BTreeMap::new(),
            project_format_version: CURRENT_FORMAT_VERSION,
            backup_before_migration: true,
            line_separator: "\n".to_string(),
            backup_dir: None,
        }
    }
}

impl EngineConfig {
    /// Build the macro table seeded by this configuration
    pub fn macro_table(&self) -> MacroTable {
        MacroTable::from_pairs(self.macros.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Load configuration from disk; a missing file yields the defaults
    pub fn load(provider: &dyn StorageProvider, path: &Path) -> Result<Self> {
        if !provider.exists(path) {
            debug!("No engine config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let format = ConfigFormat::from_path(path).ok_or_else(|| {
            Error::config(
                path.display().to_string(),
                "unknown or unsupported config format",
            )
        })?;

        let content = provider.read_to_bytes(path)?;
        let content = String::from_utf8(content)
            .map_err(|e| Error::config(format.extension(), e))?;
        Self::parse(&content, format)
    }

    /// Deserialize from string based on format
    pub fn parse(data: &str, format: ConfigFormat) -> Result<Self> {
        match format {
            ConfigFormat::Json => serde_json::from_str(data).map_err(|e| Error::config("JSON", e)),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::from_str(data).map_err(|e| Error::config("YAML", e)),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::from_str(data).map_err(|e| Error::config("TOML", e)),
        }
    }

    /// Serialize to string based on format
    pub fn render(&self, format: ConfigFormat) -> Result<String> {
        match format {
            ConfigFormat::Json => {
                serde_json::to_string_pretty(self).map_err(|e| Error::config("JSON", e))
            }
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::to_string(self).map_err(|e| Error::config("YAML", e)),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => {
                toml::to_string_pretty(self).map_err(|e| Error::config("TOML", e))
            }
        }
    }
}
