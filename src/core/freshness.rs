//! Freshness tracking
//!
//! Persists the last successful build time of each `(artifact kind,
//! variant)` pair in a flat JSON table and compares it against file
//! timestamps, so expensive phases can be skipped when nothing changed.
//!
//! Keys are `{kind}_{variant}` (or just `{kind}` for an empty variant);
//! values are epoch milliseconds.

use std::collections::BTreeMap;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use walkdir::WalkDir;

use crate::config::defaults::FRESHNESS_EXCLUDED_DIRS;
use crate::core::kind::ArtifactKind;
use crate::error::FreshnessError;
use crate::infra::filesystem;

/// Serializes read-modify-write cycles on freshness tables
static WRITE_LOCK: Mutex<()> = Mutex::new(());

/// The persisted table
pub type FreshnessTable = BTreeMap<String, u64>;

/// What a staleness check looks at
#[derive(Debug, Clone, Copy)]
pub struct FreshnessTarget<'a> {
    path: &'a Path,
    recursive: bool,
    extensions: &'a [&'a str],
}

impl<'a> FreshnessTarget<'a> {
    /// A single file or directory entry
    pub fn path(path: &'a Path) -> Self {
        Self {
            path,
            recursive: false,
            extensions: &[],
        }
    }

    /// A directory and everything below it
    pub fn tree(path: &'a Path) -> Self {
        Self {
            path,
            recursive: true,
            extensions: &[],
        }
    }

    /// Only consider files with one of these extensions
    #[must_use]
    pub fn with_extensions(mut self, extensions: &'a [&'a str]) -> Self {
        self.extensions = extensions;
        self
    }
}

/// Build timestamp store for one project
#[derive(Debug, Clone)]
pub struct FreshnessTracker {
    file: PathBuf,
}

impl FreshnessTracker {
    /// Tracker backed by `file`
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self { file: file.into() }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Table key for a record
    pub fn key(kind: ArtifactKind, variant: &str) -> String {
        if variant.is_empty() {
            kind.key().to_string()
        } else {
            format!("{}_{variant}", kind.key())
        }
    }

    /// Read the whole table
    ///
    /// A missing file is an empty table; so is an unreadable one, which is
    /// rewritten on the next mark.
    pub fn load(&self) -> Result<FreshnessTable, FreshnessError> {
        let content = filesystem::read_file_if_exists(&self.file).map_err(|e| {
            FreshnessError::Stat {
                path: self.file.clone(),
                error: e.to_string(),
            }
        })?;
        let Some(content) = content else {
            return Ok(FreshnessTable::new());
        };
        match serde_json::from_str(&content) {
            Ok(table) => Ok(table),
            Err(e) => {
                tracing::warn!("Ignoring corrupt {}: {e}", self.file.display());
                Ok(FreshnessTable::new())
            }
        }
    }

    /// Recorded time of a key, if any
    pub fn record(&self, kind: ArtifactKind, variant: &str) -> Result<Option<u64>, FreshnessError> {
        Ok(self.load()?.get(&Self::key(kind, variant)).copied())
    }

    pub fn is_recorded(&self, kind: ArtifactKind, variant: &str) -> Result<bool, FreshnessError> {
        Ok(self.record(kind, variant)?.is_some())
    }

    /// Whether `target` changed since the record was written
    ///
    /// Stale when there is no record, when the path is missing, or when any
    /// considered entry has a modification, change or (files only) access
    /// time newer than the record.
    pub fn is_stale(
        &self,
        kind: ArtifactKind,
        variant: &str,
        target: FreshnessTarget<'_>,
    ) -> Result<bool, FreshnessError> {
        let Some(recorded) = self.record(kind, variant)? else {
            tracing::debug!("No {} record, treating as stale", Self::key(kind, variant));
            return Ok(true);
        };
        if !target.path.exists() {
            return Ok(true);
        }

        if !target.recursive {
            let metadata = stat(target.path)?;
            return Ok(newest_ms(&metadata) > recorded);
        }

        let walker = WalkDir::new(target.path)
            .into_iter()
            .filter_entry(|entry| !is_excluded(entry.path(), target.path));
        for entry in walker {
            let entry = entry.map_err(|e| FreshnessError::Stat {
                path: target.path.to_path_buf(),
                error: e.to_string(),
            })?;
            if entry.file_type().is_file() && !has_extension(entry.path(), target.extensions) {
                continue;
            }
            let metadata = entry.metadata().map_err(|e| FreshnessError::Stat {
                path: entry.path().to_path_buf(),
                error: e.to_string(),
            })?;
            if newest_ms(&metadata) > recorded {
                tracing::debug!("{} changed", entry.path().display());
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Record `now` for a key
    pub fn mark_fresh(&self, kind: ArtifactKind, variant: &str) -> Result<u64, FreshnessError> {
        let now = now_ms();
        let _guard = WRITE_LOCK.lock();
        let mut table = self.load()?;
        table.insert(Self::key(kind, variant), now);
        let content = serde_json::to_string_pretty(&table).map_err(|e| FreshnessError::Write {
            path: self.file.clone(),
            error: e.to_string(),
        })?;
        filesystem::write_file(&self.file, &content).map_err(|e| FreshnessError::Write {
            path: self.file.clone(),
            error: e.to_string(),
        })?;
        tracing::debug!("Marked {} fresh at {now}", Self::key(kind, variant));
        Ok(now)
    }
}

/// Current time in epoch milliseconds
pub fn now_ms() -> u64 {
    system_ms(SystemTime::now())
}

fn system_ms(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

fn stat(path: &Path) -> Result<Metadata, FreshnessError> {
    std::fs::metadata(path).map_err(|e| FreshnessError::Stat {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Latest of the entry's timestamps, in epoch milliseconds
///
/// Directory access times are skipped; walking a directory updates them.
fn newest_ms(metadata: &Metadata) -> u64 {
    let mut newest = metadata.modified().map(system_ms).unwrap_or(0);
    if metadata.is_file() {
        newest = newest.max(metadata.accessed().map(system_ms).unwrap_or(0));
    }
    newest.max(change_ms(metadata))
}

#[cfg(unix)]
fn change_ms(metadata: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    let secs = u64::try_from(metadata.ctime()).unwrap_or(0);
    let nanos = u64::try_from(metadata.ctime_nsec()).unwrap_or(0);
    secs * 1000 + nanos / 1_000_000
}

#[cfg(not(unix))]
fn change_ms(metadata: &Metadata) -> u64 {
    metadata.created().map(system_ms).unwrap_or(0)
}

fn is_excluded(path: &Path, root: &Path) -> bool {
    path != root
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| FRESHNESS_EXCLUDED_DIRS.contains(&n))
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    extensions.iter().any(|allowed| *allowed == extension || *allowed == name)
}
