//! Progress and status reporting
//!
//! The pipeline surfaces its state through a one-way [`StatusSink`]; it
//! never reads anything back except the answer to a retry prompt.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// User-facing verbosity scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Normal,
    Detailed,
    Verbose,
    Unbearable,
}

impl LogLevel {
    /// Level selected by a repeated `-v` flag
    pub fn from_verbosity(count: u8) -> Self {
        match count {
            0 => Self::Normal,
            1 => Self::Detailed,
            2 => Self::Verbose,
            _ => Self::Unbearable,
        }
    }

    /// Whether a message at `level` is shown when `self` is configured
    pub fn allows(self, level: LogLevel) -> bool {
        self >= level
    }
}

/// Icon attached to a status line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusIcon {
    Check,
    Error,
    CircleSlash,
    Sync,
    Flame,
}

impl StatusIcon {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Check => "check",
            Self::Error => "error",
            Self::CircleSlash => "circle-slash",
            Self::Sync => "sync",
            Self::Flame => "flame",
        }
    }
}

/// How loudly a status line is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// Terminal outcome of one pipeline invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuildStatus {
    Succeeded { elapsed_ms: u64 },
    Failed { elapsed_ms: u64, error: String },
    Aborted { elapsed_ms: u64 },
    /// The lane was busy
    Rejected,
    /// Nothing to do, e.g. a hot rebuild before any full build
    Skipped { reason: String },
}

impl BuildStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded { elapsed_ms } => write!(f, "succeeded in {elapsed_ms}ms"),
            Self::Failed { elapsed_ms, .. } => write!(f, "failed ({elapsed_ms}ms)"),
            Self::Aborted { elapsed_ms } => write!(f, "aborted after {elapsed_ms}ms"),
            Self::Rejected => f.write_str("rejected, a build is already running"),
            Self::Skipped { reason } => write!(f, "skipped: {reason}"),
        }
    }
}

/// Milliseconds in a duration, saturating
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Observer of pipeline state
pub trait StatusSink: Send + Sync {
    /// A status-bar style summary
    fn status(&self, icon: StatusIcon, message: &str, severity: Severity);

    /// Overall progress, 0 to 100
    fn progress(&self, percent: u8);

    /// A log line at the given verbosity
    fn log(&self, message: &str, level: LogLevel);

    /// Host refresh hook, called when a lane flips state
    fn refresh(&self) {}

    /// Offer a retry after a precondition failure; `true` re-enters the pipeline
    fn prompt_retry(&self, _message: &str) -> bool {
        false
    }
}

/// Sink forwarding everything to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn status(&self, icon: StatusIcon, message: &str, severity: Severity) {
        match severity {
            Severity::Error => tracing::error!(icon = icon.as_str(), "{message}"),
            Severity::Warning => tracing::warn!(icon = icon.as_str(), "{message}"),
            Severity::Info | Severity::Success => tracing::info!(icon = icon.as_str(), "{message}"),
        }
    }

    fn progress(&self, percent: u8) {
        tracing::debug!("progress {percent}%");
    }

    fn log(&self, message: &str, level: LogLevel) {
        match level {
            LogLevel::Normal => tracing::info!("{message}"),
            LogLevel::Detailed | LogLevel::Verbose => tracing::debug!("{message}"),
            LogLevel::Unbearable => tracing::trace!("{message}"),
        }
    }
}
