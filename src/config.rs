//! Application configuration
//!
//! One YAML document with a section per layer. Every field has a default, so
//! a partial file (or no file at all) is valid.

use std::path::{Path, PathBuf};

use action_primitives::ActionConfig;
use cdp_adapter::CdpConfig;
use perceiver_structural::SnapshotConfig;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// File looked up in the working directory when no `--config` is given.
pub const LOCAL_CONFIG: &str = "config/pagepilot.yaml";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub browser: CdpConfig,
    pub snapshot: SnapshotConfig,
    pub action: ActionConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Used when `--log-level` is not given and `RUST_LOG` is unset.
    pub level: String,
    /// Emit one JSON object per event instead of the text format.
    pub json: bool,
    /// Also append plain-text logs to this file.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

pub async fn load_file(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
    AppConfig::from_yaml(&content)
}

/// Where the configuration should come from, in priority order: the explicit
/// path, `config/pagepilot.yaml`, then the per-user config directory.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(LOCAL_CONFIG);
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir().map(|dir| dir.join("pagepilot").join("config.yaml"))
}
