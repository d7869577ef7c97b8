//! Test utilities
//!
//! A recording status sink, project fixtures and proptest generators.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::manifest::Manifest;
use crate::core::pipeline::{BuildPipeline, BuildSettings};
use crate::core::report::{LogLevel, Severity, StatusIcon, StatusSink};

/// Pure stream whose steps are `sh` one-liners
pub const PURE_MANIFEST: &str = r#"
[project]
name = "fixture"
stream = "pure"

[build]
targets = ["App"]

[steps.resolve]
program = "sh"
args = ["-c", "mkdir -p {build_path}"]

[steps.compile]
program = "sh"
args = ["-c", "echo building {target} {mode}"]
"#;

/// Embedded stream with a long-running build step
pub const SLOW_EMBEDDED_MANIFEST: &str = r#"
[project]
name = "firmware"
stream = "embedded"

[[steps.pre_build]]
label = "prepare"
program = "sh"
args = ["-c", "true"]

[[steps.build]]
label = "compile firmware"
program = "sh"
args = ["-c", "sleep 5"]
"#;

/// A captured status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedStatus {
    pub icon: StatusIcon,
    pub message: String,
    pub severity: Severity,
}

/// Sink that keeps everything it is told
#[derive(Debug, Default)]
pub struct RecordingSink {
    statuses: Mutex<Vec<RecordedStatus>>,
    logs: Mutex<Vec<(LogLevel, String)>>,
    progress: Mutex<Vec<u8>>,
    refreshes: Mutex<usize>,
    retries: Mutex<VecDeque<bool>>,
    prompts: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers given to successive retry prompts; `false` once exhausted
    #[must_use]
    pub fn with_retries(self, answers: impl IntoIterator<Item = bool>) -> Self {
        *self.retries.lock() = answers.into_iter().collect();
        self
    }

    pub fn statuses(&self) -> Vec<RecordedStatus> {
        self.statuses.lock().clone()
    }

    pub fn statuses_with(&self, icon: StatusIcon) -> Vec<RecordedStatus> {
        self.statuses()
            .into_iter()
            .filter(|status| status.icon == icon)
            .collect()
    }

    pub fn logs(&self) -> Vec<String> {
        self.logs.lock().iter().map(|(_, line)| line.clone()).collect()
    }

    pub fn has_log(&self, needle: &str) -> bool {
        self.logs.lock().iter().any(|(_, line)| line.contains(needle))
    }

    pub fn progress(&self) -> Vec<u8> {
        self.progress.lock().clone()
    }

    pub fn refreshes(&self) -> usize {
        *self.refreshes.lock()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

impl StatusSink for RecordingSink {
    fn status(&self, icon: StatusIcon, message: &str, severity: Severity) {
        self.statuses.lock().push(RecordedStatus {
            icon,
            message: message.to_string(),
            severity,
        });
    }

    fn progress(&self, percent: u8) {
        self.progress.lock().push(percent);
    }

    fn log(&self, message: &str, level: LogLevel) {
        self.logs.lock().push((level, message.to_string()));
    }

    fn refresh(&self) {
        *self.refreshes.lock() += 1;
    }

    fn prompt_retry(&self, message: &str) -> bool {
        self.prompts.lock().push(message.to_string());
        self.retries.lock().pop_front().unwrap_or(false)
    }
}

/// Write `Package.swift` and one source file under `root`
pub fn write_swift_package(root: &Path) {
    std::fs::write(root.join("Package.swift"), "// swift-tools-version:5.9\n").unwrap();
    std::fs::create_dir_all(root.join("Sources/App")).unwrap();
    std::fs::write(root.join("Sources/App/main.swift"), "print(\"hello\")\n").unwrap();
}

/// Pipeline over `root` with default settings
pub fn pipeline_for(
    root: &Path,
    manifest: &str,
    sink: RecordingSink,
) -> (BuildPipeline, Arc<RecordingSink>) {
    pipeline_with_settings(root, manifest, BuildSettings::default(), sink)
}

/// Pipeline over `root` with explicit settings
pub fn pipeline_with_settings(
    root: &Path,
    manifest: &str,
    settings: BuildSettings,
    sink: RecordingSink,
) -> (BuildPipeline, Arc<RecordingSink>) {
    let manifest = Manifest::from_toml(manifest).unwrap();
    manifest.validate().unwrap();
    let sink = Arc::new(sink);
    let pipeline = BuildPipeline::new(root, manifest, settings, Arc::clone(&sink) as Arc<dyn StatusSink>);
    (pipeline, sink)
}

pub mod generators {
    use proptest::prelude::*;

    use crate::core::kind::{ArtifactKind, BuildKind};

    /// A Swift target name
    pub fn target_name() -> impl Strategy<Value = String> {
        "[A-Z][A-Za-z0-9]{0,15}"
    }

    /// A freshness variant such as `wasi-debug`
    pub fn variant() -> impl Strategy<Value = String> {
        (
            prop_oneof![Just("native"), Just("wasi"), Just("android")],
            prop_oneof![Just("debug"), Just("release")],
        )
            .prop_map(|(backend, mode)| format!("{backend}-{mode}"))
    }

    pub fn artifact_kind() -> impl Strategy<Value = ArtifactKind> {
        prop::sample::select(ArtifactKind::ALL.to_vec())
    }

    pub fn hot_kind() -> impl Strategy<Value = BuildKind> {
        prop::sample::select(BuildKind::HOT.to_vec())
    }

    /// File content
    pub fn content() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(any::<u8>(), 0..256)
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_recording_sink_answers_retries_in_order() {
        let sink = RecordingSink::new().with_retries([true, false]);
        assert!(sink.prompt_retry("first"));
        assert!(!sink.prompt_retry("second"));
        assert!(!sink.prompt_retry("third"));
        assert_eq!(sink.prompts(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_fixture_manifests_are_valid() {
        for content in [PURE_MANIFEST, SLOW_EMBEDDED_MANIFEST] {
            Manifest::from_toml(content).unwrap().validate().unwrap();
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_variant_generator(variant in variant()) {
            let (backend, mode) = variant.split_once('-').unwrap();
            prop_assert!(["native", "wasi", "android"].contains(&backend));
            prop_assert!(["debug", "release"].contains(&mode));
        }

        #[test]
        fn test_hot_kind_generator(kind in hot_kind()) {
            prop_assert!(kind.is_hot());
        }
    }
}
