//! CLI command for `swiftstream clear-cache`
//!
//! Removes build caches so the next build starts from scratch.

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use super::Session;
use crate::core::cache::{cache_entries, clear_cache, format_size};
use crate::core::pipeline::{BuildPipeline, BuildSettings};
use crate::core::report::TracingSink;

/// Execute the clear-cache command
pub async fn execute_clear(session: &Session) -> Result<()> {
    let manifest = session.manifest()?;
    let pipeline = BuildPipeline::new(
        &session.project_dir,
        manifest,
        BuildSettings::default(),
        Arc::new(TracingSink),
    );

    if !session.output.quiet && !session.output.json {
        println!("🧹 Cleaning cache...\n");
        for entry in cache_entries(pipeline.paths()).iter().filter(|e| e.exists) {
            println!("   {} ({})", entry.path.display(), format_size(entry.size_bytes));
        }
    }

    match clear_cache(&pipeline) {
        Ok(size_freed) => {
            if session.output.json {
                println!("{}", json!({ "cleared": true, "freed_bytes": size_freed }));
            } else if !session.output.quiet {
                if size_freed > 0 {
                    println!("✅ Cache cleared ({} freed)", format_size(size_freed));
                } else {
                    println!("✅ Cache was already empty");
                }
            }
            Ok(())
        }
        Err(e) => {
            if !session.output.json {
                println!("❌ Failed to clean cache: {e}");
            }
            Err(e.into())
        }
    }
}
