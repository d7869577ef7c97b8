//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod build;
pub mod cache;
pub mod hot;
pub mod status;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::OutputConfig;
use crate::core::global_config::GlobalConfig;
use crate::core::manifest::Manifest;
use crate::core::pipeline::{BuildPipeline, BuildSettings, CompressionFlags};
use crate::core::report::{LogLevel, StatusSink};
use crate::infra::dirs::StreamDirs;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the project
    Build {
        /// Build the release configuration
        #[arg(short, long)]
        release: bool,

        /// Ignore freshness records and rebuild everything
        #[arg(short, long)]
        force: bool,

        /// Compress wasm artifacts (overrides config)
        #[arg(long, conflicts_with = "no_compress")]
        compress: bool,

        /// Disable wasm compression (overrides config)
        #[arg(long)]
        no_compress: bool,
    },

    /// Serve hot rebuilds for file change events read from stdin
    Hot,

    /// Remove build caches
    ClearCache,

    /// Show the freshness table
    Status,
}

/// Context shared by all commands
#[derive(Debug, Clone)]
pub struct Session {
    /// Project root
    pub project_dir: PathBuf,
    /// Output flags
    pub output: OutputConfig,
}

impl Session {
    /// Global configuration; unreadable files fall back to defaults
    pub fn global_config(&self) -> GlobalConfig {
        GlobalConfig::load(&StreamDirs::new()).unwrap_or_else(|e| {
            tracing::warn!("Ignoring global configuration: {e}");
            GlobalConfig::default()
        })
    }

    /// The project manifest
    pub fn manifest(&self) -> Result<Manifest> {
        Manifest::load(&self.project_dir).with_context(|| {
            format!(
                "Failed to load the project at {}",
                self.project_dir.display()
            )
        })
    }

    /// Verbosity of status sinks
    pub fn log_level(&self, global: &GlobalConfig) -> LogLevel {
        self.output.log_level(global.logging.level)
    }

    /// Build engine for the project
    pub fn pipeline(
        &self,
        manifest: Manifest,
        global: &GlobalConfig,
        flags: CompressionFlags,
        sink: Arc<dyn StatusSink>,
    ) -> BuildPipeline {
        let settings = BuildSettings::resolve(&manifest, global, flags);
        tracing::debug!(
            "Build settings: incremental={}, gzip={}, brotli={}",
            settings.incremental,
            settings.compression.gzip_enabled(),
            settings.compression.brotli_enabled()
        );
        BuildPipeline::new(&self.project_dir, manifest, settings, sink)
    }
}

impl Commands {
    /// Execute the command
    pub async fn run(self, session: &Session) -> Result<()> {
        match self {
            Self::Build {
                release,
                force,
                compress,
                no_compress,
            } => {
                let options = build::BuildOptions {
                    release,
                    force,
                    compress,
                    no_compress,
                };
                build::execute(session, options).await
            }
            Self::Hot => hot::execute(session).await,
            Self::ClearCache => cache::execute_clear(session).await,
            Self::Status => status::execute(session).await,
        }
    }
}
