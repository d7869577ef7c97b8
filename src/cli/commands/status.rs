//! CLI command for `swiftstream status`
//!
//! Prints the freshness table of the project.

use anyhow::{Context, Result};

use super::Session;
use crate::core::freshness::FreshnessTracker;
use crate::infra::dirs::ProjectPaths;

/// Execute the status command
pub async fn execute(session: &Session) -> Result<()> {
    let manifest = session.manifest()?;
    let paths = ProjectPaths::new(&session.project_dir);
    let tracker = FreshnessTracker::new(paths.timestamps_file());
    let table = tracker
        .load()
        .with_context(|| format!("Failed to read {}", tracker.file().display()))?;

    if session.output.json {
        println!("{}", serde_json::to_string_pretty(&table)?);
        return Ok(());
    }
    if session.output.quiet {
        return Ok(());
    }

    println!("📦 {} ({})\n", manifest.project.name, manifest.project.stream);
    if table.is_empty() {
        println!("⚠️  Nothing built yet");
        return Ok(());
    }
    let width = table.keys().map(String::len).max().unwrap_or(0);
    for (key, timestamp) in &table {
        println!("  {key:<width$}  {timestamp}");
    }
    Ok(())
}
