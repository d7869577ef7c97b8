//! Build command implementation
//!
//! Implements `swiftstream build`: one pipeline run on the chosen lane.
//! Ctrl-C aborts the build.

use std::sync::Arc;

use anyhow::{bail, Result};

use super::Session;
use crate::cli::output::ConsoleSink;
use crate::core::kind::BuildKind;
use crate::core::pipeline::{BuildRequest, CompressionFlags};
use crate::core::report::{BuildStatus, StatusSink};

/// Build options
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Build the release configuration
    pub release: bool,
    /// Ignore freshness records
    pub force: bool,
    /// Enable wasm compression
    pub compress: bool,
    /// Disable wasm compression
    pub no_compress: bool,
}

impl BuildOptions {
    pub fn kind(self) -> BuildKind {
        if self.release {
            BuildKind::Release
        } else {
            BuildKind::Debug
        }
    }
}

/// Execute the build command
pub async fn execute(session: &Session, options: BuildOptions) -> Result<()> {
    let manifest = session.manifest()?;
    let global = session.global_config();
    tracing::info!("Building project: {}", manifest.project.name);

    let sink = Arc::new(ConsoleSink::new(session.output, session.log_level(&global)));
    let flags = CompressionFlags {
        compress: options.compress,
        no_compress: options.no_compress,
    };
    let pipeline = session.pipeline(manifest, &global, flags, Arc::clone(&sink) as Arc<dyn StatusSink>);

    let kind = options.kind();
    let interrupt = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, aborting {kind}");
                pipeline.abort(kind.lane());
            }
        })
    };

    let status = pipeline
        .run(BuildRequest::new(kind).forced(options.force))
        .await;
    interrupt.abort();
    sink.finish();

    if session.output.json {
        println!("{}", serde_json::to_string(&status)?);
    }
    check_status(&status)
}

/// Map a terminal status to the command result
pub fn check_status(status: &BuildStatus) -> Result<()> {
    match status {
        BuildStatus::Succeeded { .. } | BuildStatus::Skipped { .. } => Ok(()),
        BuildStatus::Failed { elapsed_ms, .. } => bail!("Build failed after {elapsed_ms}ms"),
        BuildStatus::Aborted { elapsed_ms } => bail!("Build aborted after {elapsed_ms}ms"),
        BuildStatus::Rejected => bail!("A build is already running"),
    }
}
