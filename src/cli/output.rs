//! Output formatting and progress indicators
//!
//! This module provides the console status sink, progress bars and
//! formatted messages to the user.

use std::io::{BufRead, IsTerminal, Write};
use std::sync::OnceLock;

use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

use crate::core::report::{LogLevel, Severity, StatusIcon, StatusSink};

static GLOBAL_OUTPUT: OnceLock<OutputConfig> = OnceLock::new();

/// Output settings selected by the global CLI flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputConfig {
    /// Only errors are printed
    pub quiet: bool,
    /// Machine-readable output
    pub json: bool,
    /// Number of `-v` flags
    pub verbose: u8,
}

impl OutputConfig {
    pub fn new(quiet: bool, json: bool, verbose: u8) -> Self {
        Self {
            quiet,
            json,
            verbose,
        }
    }

    /// Make this configuration visible to [`OutputConfig::global`]
    pub fn apply_global(self) {
        if GLOBAL_OUTPUT.set(self).is_err() {
            tracing::debug!("Output configuration already applied");
        }
    }

    /// The applied configuration, or the default one
    pub fn global() -> Self {
        GLOBAL_OUTPUT.get().copied().unwrap_or_default()
    }

    /// Verbosity for status sinks
    ///
    /// `-v` flags win; without them the configured level is used.
    pub fn log_level(self, configured: Option<LogLevel>) -> LogLevel {
        if self.verbose > 0 {
            LogLevel::from_verbosity(self.verbose)
        } else {
            configured.unwrap_or_default()
        }
    }
}

/// Print an error that ends the program
pub fn display_error(error: &anyhow::Error) {
    if OutputConfig::global().json {
        eprintln!("{}", json!({ "error": format!("{error:#}") }));
    } else {
        eprintln!("{} {error:#}", status::ERROR);
    }
}

/// Create a spinner for operations with unknown duration
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

/// Create a percentage bar for builds
pub fn create_build_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░"),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Warning prefix (yellow triangle)
    pub const WARNING: &str = "⚠";

    /// Info prefix (blue circle)
    pub const INFO: &str = "ℹ";
}

/// Prefix for a severity
pub fn prefix(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => status::INFO,
        Severity::Success => status::SUCCESS,
        Severity::Warning => status::WARNING,
        Severity::Error => status::ERROR,
    }
}

/// Status sink printing to the terminal
///
/// In `--json` mode every status and log line is one JSON object on
/// stdout. In quiet mode only error statuses are printed, on stderr.
pub struct ConsoleSink {
    output: OutputConfig,
    level: LogLevel,
    bar: ProgressBar,
    interactive: bool,
}

impl ConsoleSink {
    pub fn new(output: OutputConfig, level: LogLevel) -> Self {
        let interactive = std::io::stderr().is_terminal() && std::io::stdin().is_terminal();
        Self::with_terminal(output, level, interactive)
    }

    /// Sink without progress bar or retry prompts
    ///
    /// For hosts that own stdin, such as the `hot` event loop.
    pub fn non_interactive(output: OutputConfig, level: LogLevel) -> Self {
        Self::with_terminal(output, level, false)
    }

    fn with_terminal(output: OutputConfig, level: LogLevel, interactive: bool) -> Self {
        let bar = if interactive && !output.quiet && !output.json {
            create_build_bar()
        } else {
            ProgressBar::hidden()
        };
        Self {
            output,
            level,
            bar,
            interactive,
        }
    }

    /// Remove the progress bar
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn print(&self, line: &str) {
        if self.bar.is_hidden() {
            println!("{line}");
        } else {
            self.bar.println(line);
        }
    }
}

impl StatusSink for ConsoleSink {
    fn status(&self, icon: StatusIcon, message: &str, severity: Severity) {
        if self.output.json {
            println!(
                "{}",
                json!({
                    "event": "status",
                    "icon": icon.as_str(),
                    "severity": severity,
                    "message": message,
                })
            );
        } else if self.output.quiet {
            if severity == Severity::Error {
                eprintln!("{} {message}", status::ERROR);
            }
        } else {
            self.bar.set_message(message.to_string());
            self.print(&format!("{} {message}", prefix(severity)));
        }
    }

    fn progress(&self, percent: u8) {
        self.bar.set_position(u64::from(percent));
    }

    fn log(&self, message: &str, level: LogLevel) {
        if !self.level.allows(level) {
            return;
        }
        if self.output.json {
            println!(
                "{}",
                json!({ "event": "log", "level": level, "message": message })
            );
        } else if !self.output.quiet {
            self.print(message);
        }
    }

    fn refresh(&self) {
        tracing::trace!("Lane state changed");
    }

    fn prompt_retry(&self, message: &str) -> bool {
        if !self.interactive || self.output.json {
            return false;
        }
        self.bar.suspend(|| {
            eprint!("{} {message}. Retry? [y/N] ", status::WARNING);
            if std::io::stderr().flush().is_err() {
                return false;
            }
            let mut answer = String::new();
            if std::io::stdin().lock().read_line(&mut answer).is_err() {
                return false;
            }
            matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_flag_wins_over_configured_level() {
        let output = OutputConfig::new(false, false, 2);
        assert_eq!(output.log_level(Some(LogLevel::Detailed)), LogLevel::Verbose);
    }

    #[test]
    fn test_configured_level_without_flags() {
        let output = OutputConfig::new(false, false, 0);
        assert_eq!(output.log_level(Some(LogLevel::Detailed)), LogLevel::Detailed);
        assert_eq!(output.log_level(None), LogLevel::Normal);
    }

    #[test]
    fn test_prefixes() {
        assert_eq!(prefix(Severity::Success), "✓");
        assert_eq!(prefix(Severity::Error), "✗");
        assert_eq!(prefix(Severity::Warning), "⚠");
        assert_eq!(prefix(Severity::Info), "ℹ");
    }

    #[test]
    fn test_json_sink_never_prompts() {
        let sink = ConsoleSink::new(OutputConfig::new(false, true, 0), LogLevel::Normal);
        assert!(!sink.prompt_retry("Missing `JavaScriptKit` package"));
        sink.finish();
    }

    #[test]
    fn test_non_interactive_sink_never_prompts() {
        let sink = ConsoleSink::non_interactive(OutputConfig::new(false, false, 0), LogLevel::Normal);
        assert!(!sink.interactive);
        assert!(sink.bar.is_hidden());
        assert!(!sink.prompt_retry("No targets to build"));
    }
}
