//! Build cache management
//!
//! Clearing the cache removes the `.build` folder (compiler output,
//! checkouts and the freshness table) and the development output folder,
//! forcing the next build to start from scratch.

use std::path::PathBuf;

use crate::core::kind::{BuildMode, Lane};
use crate::core::pipeline::BuildPipeline;
use crate::error::StreamError;
use crate::infra::dirs::ProjectPaths;
use crate::infra::filesystem;

/// Size of a cached folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Folder path
    pub path: PathBuf,
    /// Total size in bytes
    pub size_bytes: u64,
    /// Whether the folder exists
    pub exists: bool,
}

/// Folders removed by [`clear_cache`]
pub fn cache_entries(paths: &ProjectPaths) -> Vec<CacheEntry> {
    [paths.build_dir(), paths.output_dir(BuildMode::Debug)]
        .into_iter()
        .map(|path| CacheEntry {
            exists: path.exists(),
            size_bytes: filesystem::dir_size(&path),
            path,
        })
        .collect()
}

/// Remove the build caches of a project
///
/// Refused while either lane of `pipeline` is running. Returns the number
/// of bytes freed.
pub fn clear_cache(pipeline: &BuildPipeline) -> Result<u64, StreamError> {
    for lane in [Lane::Debug, Lane::Release] {
        if pipeline.lane(lane).is_running() {
            return Err(StreamError::Generic(format!(
                "Unable to clear the cache while the {lane} build is running"
            )));
        }
    }

    let mut freed = 0;
    for entry in cache_entries(pipeline.paths()) {
        if filesystem::remove_dir_all(&entry.path)? {
            tracing::info!("Removed {}", entry.path.display());
            freed += entry.size_bytes;
        }
    }
    Ok(freed)
}

/// Format size for display
pub fn format_size(size_bytes: u64) -> String {
    #[allow(clippy::cast_precision_loss)]
    let size = size_bytes as f64;
    if size_bytes < 1024 {
        format!("{size_bytes} bytes")
    } else if size_bytes < 1024 * 1024 {
        format!("{:.1} KB", size / 1024.0)
    } else if size_bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", size / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", size / (1024.0 * 1024.0 * 1024.0))
    }
}
