//! Directory management
//!
//! Two kinds of locations live here: the per-user config directory that
//! holds the global `config.toml`, and the fixed layout of a project
//! directory (`.build`, freshness table, output folders).
//!
//! `SWIFTSTREAM_CONFIG_DIR` overrides the platform config directory.

use std::env;
use std::path::{Path, PathBuf};

use crate::config::defaults::{
    BUILD_DIR, DEV_OUTPUT_DIR, PACKAGE_MANIFEST, RELEASE_OUTPUT_DIR, SOURCES_DIR, TIMESTAMPS_FILE,
};
use crate::core::kind::{Backend, BuildMode};

/// Environment variable overriding the config directory
pub const ENV_CONFIG_DIR: &str = "SWIFTSTREAM_CONFIG_DIR";

/// Application name used in directory paths
const APP_NAME: &str = "swiftstream";

/// Per-user directories
#[derive(Debug, Clone)]
pub struct StreamDirs {
    config_dir: PathBuf,
}

impl StreamDirs {
    /// Resolve from the environment, falling back to platform defaults
    #[must_use]
    pub fn new() -> Self {
        let config_dir = env::var(ENV_CONFIG_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::platform_config_dir());
        Self { config_dir }
    }

    /// Use an explicit config directory
    #[must_use]
    pub fn with_config_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// The config directory
    ///
    /// - Linux: `$XDG_CONFIG_HOME/swiftstream` or `~/.config/swiftstream`
    /// - macOS: `~/Library/Application Support/swiftstream`
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Path of the global `config.toml`
    #[must_use]
    pub fn global_config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    fn platform_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .map(|h| h.join(".config").join(APP_NAME))
                    .unwrap_or_else(|| PathBuf::from(".").join(".config").join(APP_NAME))
            })
    }
}

impl Default for StreamDirs {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed locations inside a project directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    root: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `.build`
    pub fn build_dir(&self) -> PathBuf {
        self.root.join(BUILD_DIR)
    }

    /// `.build/.{backend}`, the per-backend build folder
    pub fn backend_build_dir(&self, backend: Backend) -> PathBuf {
        self.build_dir().join(format!(".{}", backend.as_str()))
    }

    /// `.build/buildTimestamps.json`
    pub fn timestamps_file(&self) -> PathBuf {
        self.build_dir().join(TIMESTAMPS_FILE)
    }

    /// `Package.swift`
    pub fn package_manifest(&self) -> PathBuf {
        self.root.join(PACKAGE_MANIFEST)
    }

    /// `Sources`
    pub fn sources_dir(&self) -> PathBuf {
        self.root.join(SOURCES_DIR)
    }

    /// Output folder for the given mode
    pub fn output_dir(&self, mode: BuildMode) -> PathBuf {
        match mode {
            BuildMode::Debug => self.root.join(DEV_OUTPUT_DIR),
            BuildMode::Release => self.root.join(RELEASE_OUTPUT_DIR),
        }
    }

    /// A checked out companion package for a backend
    pub fn checkout_dir(&self, backend: Backend, package: &str) -> PathBuf {
        self.backend_build_dir(backend).join("checkouts").join(package)
    }
}
