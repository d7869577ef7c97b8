//! Wasm artifact compression
//!
//! Compression is optional post-processing: gzip and brotli jobs run in the
//! background while the pipeline moves on, and their outcome is only
//! checked at a designated join point ([`CompressionJobs::wait`]). A
//! missing compressor is a warning, never a failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::defaults::COMPRESSION_POLL_INTERVAL;
use crate::core::abort::AbortHandle;
use crate::core::kind::BuildMode;
use crate::error::BuildError;
use crate::infra::process::{Invocation, ProcessExecutor};

/// Which compressors run
#[derive(Debug, Clone, Default)]
pub struct CompressionConfig {
    /// Configured gzip setting (manifest, then global config)
    pub gzip: bool,
    /// Configured brotli setting (manifest, then global config)
    pub brotli: bool,
    /// CLI --compress flag
    pub cli_compress: bool,
    /// CLI --no-compress flag
    pub cli_no_compress: bool,
}

impl CompressionConfig {
    fn resolve(&self, configured: bool) -> bool {
        if self.cli_no_compress {
            return false;
        }
        if self.cli_compress {
            return true;
        }
        configured
    }

    pub fn gzip_enabled(&self) -> bool {
        self.resolve(self.gzip)
    }

    pub fn brotli_enabled(&self) -> bool {
        self.resolve(self.brotli)
    }

    pub fn is_enabled(&self) -> bool {
        self.gzip_enabled() || self.brotli_enabled()
    }
}

/// A compressor program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compressor {
    Gzip,
    Brotli,
}

impl Compressor {
    pub fn program(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Brotli => "brotli",
        }
    }

    /// Output file written next to the input
    pub fn output_path(self, file: &Path) -> PathBuf {
        let suffix = match self {
            Self::Gzip => "gz",
            Self::Brotli => "br",
        };
        let mut name = file.as_os_str().to_owned();
        name.push(".");
        name.push(suffix);
        PathBuf::from(name)
    }

    fn invocation(self, file: &Path, mode: BuildMode) -> Invocation {
        let file = file.to_string_lossy().to_string();
        let level = match (self, mode) {
            (Self::Gzip, BuildMode::Release) => "-9",
            (Self::Gzip, BuildMode::Debug) => "-6",
            (Self::Brotli, BuildMode::Release) => "--quality=11",
            (Self::Brotli, BuildMode::Debug) => "--quality=5",
        };
        Invocation::program(self.program())
            .args(["-k", "-f", level])
            .args([file.clone()])
            .describe(format!("{} {file}", self.program()))
    }
}

#[derive(Debug, Default)]
struct JobsState {
    spawned: usize,
    finished: usize,
    failure: Option<String>,
}

/// Background compression jobs of one build
#[derive(Debug, Clone, Default)]
pub struct CompressionJobs {
    state: Arc<Mutex<JobsState>>,
}

impl CompressionJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start compressing `file`; returns whether a job was spawned
    pub fn spawn(
        &self,
        executor: &Arc<ProcessExecutor>,
        compressor: Compressor,
        file: &Path,
        mode: BuildMode,
    ) -> bool {
        if executor.which(compressor.program()).is_none() {
            tracing::warn!(
                "{} not found, skipping compression of {}",
                compressor.program(),
                file.display()
            );
            return false;
        }

        self.state.lock().spawned += 1;
        let invocation = compressor.invocation(file, mode);
        let executor = Arc::clone(executor);
        let state = Arc::clone(&self.state);
        let label = file.display().to_string();
        tokio::spawn(async move {
            let outcome = executor.execute(&invocation).await;
            let mut state = state.lock();
            match outcome {
                Ok(result) => {
                    tracing::debug!("Compressed {label} in {}ms", result.duration_ms);
                    state.finished += 1;
                }
                Err(e) => {
                    tracing::debug!("Unable to compress {label}: {e}");
                    state.finished += 1;
                    state.failure.get_or_insert_with(|| e.to_string());
                }
            }
        });
        true
    }

    pub fn spawned(&self) -> usize {
        self.state.lock().spawned
    }

    /// Wait until every job finished
    ///
    /// Rejects with the first collected failure. Returns early, without
    /// error, once `abort` is cancelled; the jobs themselves keep running.
    pub async fn wait(&self, abort: &AbortHandle) -> Result<(), BuildError> {
        loop {
            {
                let state = self.state.lock();
                if let Some(failure) = &state.failure {
                    return Err(BuildError::Compression(failure.clone()));
                }
                if state.finished == state.spawned {
                    return Ok(());
                }
            }
            if abort.is_cancelled() {
                return Ok(());
            }
            tokio::time::sleep(COMPRESSION_POLL_INTERVAL).await;
        }
    }
}
