//! Error types for swiftstream
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

use crate::infra::process::ProcessResult;

/// External process errors
#[derive(Error, Debug, Clone)]
pub enum ExecutionError {
    /// Program could not be located on `PATH`
    #[error("{program} is not available")]
    NotFound { program: String },

    /// The OS refused to spawn the program
    #[error("Unable to spawn '{program}': {error}")]
    Spawn {
        program: String,
        error: String,
        partial: ProcessResult,
    },

    /// The program exited with a non-zero code
    #[error("{}", describe_failure(.result))]
    NonZeroExit { result: ProcessResult },

    /// The program was killed because its build was aborted
    #[error("'{}' was terminated", .result.executable.display())]
    Terminated { result: ProcessResult },
}

impl ExecutionError {
    /// The captured result, if the process got far enough to produce one
    pub fn result(&self) -> Option<&ProcessResult> {
        match self {
            Self::NotFound { .. } => None,
            Self::Spawn { partial, .. } => Some(partial),
            Self::NonZeroExit { result } | Self::Terminated { result } => Some(result),
        }
    }
}

fn describe_failure(result: &ProcessResult) -> String {
    let mut text = String::from("⛔️");
    if let Some(description) = &result.description {
        text.push_str(&format!(" Unable to {description},"));
    }
    text.push_str(&format!(
        " exit code {} (executed in {}ms)",
        result.code, result.duration_ms
    ));
    if !result.stderr.is_empty() {
        text.push('\n');
        text.push_str(&result.stderr);
    }
    if !result.stdout.is_empty() {
        text.push('\n');
        text.push_str(&result.stdout);
    }
    text
}

/// Freshness table errors
#[derive(Error, Debug)]
pub enum FreshnessError {
    /// Failed to read a path's metadata
    #[error("Failed to inspect '{path}': {error}")]
    Stat { path: PathBuf, error: String },

    /// Failed to persist the table
    #[error("Failed to write build timestamps to '{path}': {error}")]
    Write { path: PathBuf, error: String },
}

/// Project manifest errors
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Manifest not found
    #[error("Manifest not found at '{path}'. Create a swiftstream.toml to describe the project.")]
    NotFound { path: PathBuf },

    /// Failed to read manifest
    #[error("Failed to read manifest '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Failed to parse manifest
    #[error("Failed to parse manifest: {0}")]
    Parse(String),

    /// Semantically invalid manifest
    #[error("Invalid manifest: {0}")]
    Invalid(String),
}

/// Build pipeline errors
///
/// An aborted build is a terminal status, never an error.
#[derive(Error, Debug)]
pub enum BuildError {
    /// A precondition is not met; the user may retry after fixing it
    #[error("{0}")]
    Precondition(String),

    /// Plain failure message, rendered verbatim
    #[error("{0}")]
    Message(String),

    /// External tool failed
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// A queued step resolved `false`
    #[error("{label} failed, check output for details")]
    Step { label: String },

    /// Freshness table failure
    #[error(transparent)]
    Freshness(#[from] FreshnessError),

    /// Compression job failed
    #[error("Compression failed: {0}")]
    Compression(String),

    /// Filesystem failure
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },
}

impl BuildError {
    /// Whether the user is offered a retry that re-enters the pipeline
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Precondition(_))
    }

    /// Render for the output sink
    ///
    /// String-like errors are printed verbatim, structured ones as JSON.
    pub fn render(&self) -> String {
        match self {
            Self::Execution(error) => match error.result() {
                Some(result) => serde_json::to_string(result).unwrap_or_else(|_| error.to_string()),
                None => error.to_string(),
            },
            other => other.to_string(),
        }
    }
}

/// Top-level swiftstream error type
#[derive(Error, Debug)]
pub enum StreamError {
    /// Manifest error
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Build error
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    /// Freshness error
    #[error("Freshness error: {0}")]
    Freshness(#[from] FreshnessError),

    /// Filesystem error
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),

    /// Generic error
    #[error("{0}")]
    Generic(String),
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to remove directory
    #[error("Failed to remove directory '{path}': {error}")]
    RemoveDir { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },

    /// Failed to read file
    #[error("Failed to read file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> ProcessResult {
        ProcessResult {
            executable: PathBuf::from("/usr/bin/swift"),
            description: Some("build App".to_string()),
            duration_ms: 12,
            code: 1,
            stdout: String::new(),
            stderr: "error: no such module".to_string(),
        }
    }

    #[test]
    fn test_message_renders_verbatim() {
        let error = BuildError::Message("App is missing in the Package.swift".to_string());
        assert_eq!(error.render(), "App is missing in the Package.swift");
    }

    #[test]
    fn test_execution_error_renders_json() {
        let error = BuildError::Execution(ExecutionError::NonZeroExit {
            result: sample_result(),
        });
        let rendered = error.render();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["code"], 1);
        assert_eq!(value["stderr"], "error: no such module");
    }

    #[test]
    fn test_not_found_renders_message() {
        let error = BuildError::Execution(ExecutionError::NotFound {
            program: "brotli".to_string(),
        });
        assert_eq!(error.render(), "brotli is not available");
    }

    #[test]
    fn test_non_zero_exit_description() {
        let error = ExecutionError::NonZeroExit {
            result: sample_result(),
        };
        let text = error.to_string();
        assert!(text.contains("Unable to build App"));
        assert!(text.contains("exit code 1"));
        assert!(text.contains("no such module"));
    }

    #[test]
    fn test_only_preconditions_are_retryable() {
        assert!(BuildError::Precondition("x".into()).is_retryable());
        assert!(!BuildError::Message("x".into()).is_retryable());
        assert!(!BuildError::Step { label: "x".into() }.is_retryable());
    }
}
