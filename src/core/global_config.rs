//! Global configuration management
//!
//! Reads per-user defaults from `config.toml` in the config directory.
//! Every value is optional; the project manifest and CLI flags take
//! precedence over anything set here.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::report::LogLevel;
use crate::infra::dirs::StreamDirs;

/// Global configuration error types
#[derive(Error, Debug)]
pub enum GlobalConfigError {
    /// Failed to read config file
    #[error("Failed to read config file '{path}': {error}")]
    ReadError { path: String, error: String },

    /// Failed to parse config file
    #[error("Failed to parse config file '{path}': {error}")]
    ParseError { path: String, error: String },
}

/// Global configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Default build options
    #[serde(default)]
    pub build: BuildDefaults,

    /// Hot rebuild settings
    #[serde(default)]
    pub hot_rebuild: HotRebuildConfig,
}

/// Logging settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Verbosity used when no `-v` flag is given
    pub level: Option<LogLevel>,
}

/// Default build options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildDefaults {
    /// Gzip wasm artifacts
    pub gzip: Option<bool>,
    /// Brotli wasm artifacts
    pub brotli: Option<bool>,
    /// Skip executable builds whose sources are unchanged
    pub incremental: Option<bool>,
}

/// Hot rebuild settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HotRebuildConfig {
    /// Accept file change events
    pub enabled: Option<bool>,
}

impl GlobalConfig {
    /// Load from the config directory
    ///
    /// A missing file yields the default configuration.
    pub fn load(dirs: &StreamDirs) -> Result<Self, GlobalConfigError> {
        Self::load_from_path(&dirs.global_config_path())
    }

    /// Load from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, GlobalConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| GlobalConfigError::ReadError {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| GlobalConfigError::ParseError {
            path: path.display().to_string(),
            error: e.to_string(),
        })
    }

    pub fn hot_rebuild_enabled(&self) -> bool {
        self.hot_rebuild.enabled.unwrap_or(true)
    }
}
