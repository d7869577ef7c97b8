//! Build pipeline
//!
//! One engine runs every build of a project: it acquires the request's
//! lane, runs the planned phases in order and reports exactly one terminal
//! status. The lane is idle again when [`BuildPipeline::run`] returns.
//!
//! ```text
//! Idle -> Running -> Succeeded | Failed | Aborted -> Idle
//! ```
//!
//! Aborts are reported by the abort callback, not by the phase that
//! happened to be running; phases only stop early.

use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::core::compress::CompressionConfig;
use crate::core::freshness::FreshnessTracker;
use crate::core::global_config::GlobalConfig;
use crate::core::kind::{ArtifactKind, Backend, BuildKind, Lane};
use crate::core::manifest::Manifest;
use crate::core::phases::{plan, BuildContext, Outcome};
use crate::core::profile::StreamProfile;
use crate::core::report::{millis, BuildStatus, LogLevel, Severity, StatusIcon, StatusSink};
use crate::core::state::{BuildState, BuildTicket};
use crate::core::task_runner::TaskRunner;
use crate::error::BuildError;
use crate::infra::dirs::ProjectPaths;
use crate::infra::process::ProcessExecutor;

/// A request to build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// What to build
    pub kind: BuildKind,
    /// Ignore freshness records
    pub force: bool,
    /// Executable to narrow a hot Swift rebuild to
    pub target_hint: Option<String>,
}

impl BuildRequest {
    pub fn new(kind: BuildKind) -> Self {
        Self {
            kind,
            force: false,
            target_hint: None,
        }
    }

    #[must_use]
    pub fn forced(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    #[must_use]
    pub fn with_target_hint(mut self, hint: Option<String>) -> Self {
        self.target_hint = hint;
        self
    }
}

/// CLI compression flags
#[derive(Debug, Clone, Copy, Default)]
pub struct CompressionFlags {
    pub compress: bool,
    pub no_compress: bool,
}

/// Effective build settings
#[derive(Debug, Clone, Default)]
pub struct BuildSettings {
    pub compression: CompressionConfig,
    /// Gate executable builds by freshness
    pub incremental: bool,
}

impl BuildSettings {
    /// Combine manifest, global config and CLI flags
    ///
    /// The manifest wins over the global config; CLI flags win over both.
    pub fn resolve(manifest: &Manifest, global: &GlobalConfig, flags: CompressionFlags) -> Self {
        let configured = |project: Option<bool>, user: Option<bool>| project.or(user).unwrap_or(false);
        Self {
            compression: CompressionConfig {
                gzip: configured(manifest.build.gzip, global.build.gzip),
                brotli: configured(manifest.build.brotli, global.build.brotli),
                cli_compress: flags.compress,
                cli_no_compress: flags.no_compress,
            },
            incremental: configured(manifest.build.incremental, global.build.incremental),
        }
    }
}

struct LaneSlot {
    state: Arc<BuildState>,
    runner: TaskRunner,
}

pub(crate) struct PipelineInner {
    pub(crate) paths: ProjectPaths,
    pub(crate) manifest: Manifest,
    pub(crate) profile: StreamProfile,
    pub(crate) settings: BuildSettings,
    pub(crate) executor: Arc<ProcessExecutor>,
    pub(crate) freshness: FreshnessTracker,
    pub(crate) sink: Arc<dyn StatusSink>,
    debug: LaneSlot,
    release: LaneSlot,
}

/// Build engine of one project
///
/// Cheap to clone; clones share lanes, runners and the freshness table.
#[derive(Clone)]
pub struct BuildPipeline {
    pub(crate) inner: Arc<PipelineInner>,
}

impl std::fmt::Debug for BuildPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildPipeline")
            .field("root", &self.inner.paths.root())
            .field("stream", &self.inner.profile.stream)
            .finish_non_exhaustive()
    }
}

impl BuildPipeline {
    /// Create the engine for the project at `root`
    pub fn new(
        root: &Path,
        manifest: Manifest,
        settings: BuildSettings,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        let paths = ProjectPaths::new(root);
        let profile = StreamProfile::for_stream(manifest.project.stream)
            .with_backends(manifest.build.backends.clone());
        let executor = Arc::new(ProcessExecutor::new());
        let slot = |lane| LaneSlot {
            state: BuildState::with_refresh(lane, Arc::clone(&sink)),
            runner: TaskRunner::new(Arc::clone(&executor), root),
        };

        Self {
            inner: Arc::new(PipelineInner {
                freshness: FreshnessTracker::new(paths.timestamps_file()),
                debug: slot(Lane::Debug),
                release: slot(Lane::Release),
                paths,
                manifest,
                profile,
                settings,
                executor,
                sink,
            }),
        }
    }

    pub fn paths(&self) -> &ProjectPaths {
        &self.inner.paths
    }

    pub fn manifest(&self) -> &Manifest {
        &self.inner.manifest
    }

    pub fn profile(&self) -> &StreamProfile {
        &self.inner.profile
    }

    pub fn freshness(&self) -> &FreshnessTracker {
        &self.inner.freshness
    }

    fn slot(&self, lane: Lane) -> &LaneSlot {
        match lane {
            Lane::Debug => &self.inner.debug,
            Lane::Release => &self.inner.release,
        }
    }

    pub fn lane(&self, lane: Lane) -> &Arc<BuildState> {
        &self.slot(lane).state
    }

    /// Abort the build running on `lane`; returns whether there was one
    pub fn abort(&self, lane: Lane) -> bool {
        self.lane(lane).abort_current()
    }

    /// Acquire the lane for `kind`
    ///
    /// The lane's runner is reset and attached to the new abort handle.
    pub fn try_begin(&self, kind: BuildKind) -> Option<BuildTicket> {
        let slot = self.slot(kind.lane());
        let sink = Arc::clone(&self.inner.sink);
        let ticket = slot.state.try_begin(kind, move |elapsed| {
            sink.status(
                StatusIcon::CircleSlash,
                &format!("Aborted {} after {}ms", kind.title(), millis(elapsed)),
                Severity::Warning,
            );
        })?;
        slot.runner.reset();
        ticket.abort_handle().attach_runner(slot.runner.clone());
        Some(ticket)
    }

    /// Run a build to its terminal status
    ///
    /// A busy lane rejects the request. Precondition failures offer a
    /// retry through the sink, which re-enters from the top.
    pub async fn run(&self, request: BuildRequest) -> BuildStatus {
        loop {
            let Some(ticket) = self.try_begin(request.kind) else {
                self.inner.sink.status(
                    StatusIcon::Sync,
                    &format!("{} is already running", request.kind.lane()),
                    Severity::Warning,
                );
                return BuildStatus::Rejected;
            };
            let (status, retryable) = self.drive(ticket, &request).await;
            if let BuildStatus::Failed { error, .. } = &status {
                if retryable && self.inner.sink.prompt_retry(error) {
                    tracing::info!("Retrying {}", request.kind);
                    continue;
                }
            }
            return status;
        }
    }

    /// Run a build on an already acquired lane
    pub async fn run_with_ticket(&self, ticket: BuildTicket, request: BuildRequest) -> BuildStatus {
        self.drive(ticket, &request).await.0
    }

    async fn drive(&self, ticket: BuildTicket, request: &BuildRequest) -> (BuildStatus, bool) {
        let kind = ticket.kind();
        let sink = &self.inner.sink;
        tracing::info!("Starting {kind} build in {}", self.inner.paths.root().display());
        sink.status(StatusIcon::Sync, &format!("{}...", kind.title()), Severity::Info);

        let outcome = self.execute(&ticket, request).await;
        let elapsed_ms = millis(ticket.elapsed());
        if !ticket.finish() {
            return (BuildStatus::Aborted { elapsed_ms }, false);
        }

        match outcome {
            Ok(Outcome::Completed) => {
                sink.status(
                    StatusIcon::Check,
                    &format!("{} Succeeded in {elapsed_ms}ms", kind.title()),
                    Severity::Success,
                );
                (BuildStatus::Succeeded { elapsed_ms }, false)
            }
            Ok(Outcome::Skipped(reason)) => {
                sink.log(&reason, LogLevel::Normal);
                (BuildStatus::Skipped { reason }, false)
            }
            Err(error) => {
                let rendered = error.render();
                sink.log(&format!("🧯 {rendered}"), LogLevel::Normal);
                sink.status(
                    StatusIcon::Error,
                    &format!("{} Failed ({elapsed_ms}ms)", kind.title()),
                    Severity::Error,
                );
                (
                    BuildStatus::Failed {
                        elapsed_ms,
                        error: rendered,
                    },
                    error.is_retryable(),
                )
            }
        }
    }

    async fn execute(&self, ticket: &BuildTicket, request: &BuildRequest) -> Result<Outcome, BuildError> {
        if request.kind == BuildKind::HotSwift {
            if let Some(backend) = self.first_unbuilt_backend()? {
                return Ok(Outcome::Skipped(format!(
                    "Hot rebuild skipped, run a debug build for {backend} first"
                )));
            }
        }

        let phases = plan(&self.inner.profile, request.kind);
        let runner = self.slot(request.kind.lane()).runner.clone();
        let variant = format!("{}-{}", self.inner.profile.primary_backend(), request.kind.mode());
        let fresh_build = !self
            .inner
            .freshness
            .is_recorded(ArtifactKind::SwiftSources, &variant)?;
        let mut cx = BuildContext::new(ticket, request, runner, fresh_build);
        let total = phases.len().max(1);

        for (index, phase) in phases.iter().enumerate() {
            if ticket.is_cancelled() {
                return Ok(Outcome::Completed);
            }
            let percent = u8::try_from(index * 100 / total).unwrap_or(100);
            self.inner.sink.progress(percent);
            self.inner.sink.log(phase.title(), LogLevel::Detailed);
            self.run_phase(&mut cx, *phase).await?;
        }

        self.inner.sink.progress(100);
        Ok(Outcome::Completed)
    }

    fn first_unbuilt_backend(&self) -> Result<Option<Backend>, BuildError> {
        for backend in &self.inner.profile.backends {
            let variant = format!("{backend}-debug");
            if !self
                .inner
                .freshness
                .is_recorded(ArtifactKind::SwiftSources, &variant)?
            {
                return Ok(Some(*backend));
            }
        }
        Ok(None)
    }
}

/// What the hot-rebuild coalescer needs from a build engine
pub trait HotRebuild: Send + Sync + 'static {
    /// Acquire the lane for `kind` without waiting
    fn try_begin(&self, kind: BuildKind) -> Option<BuildTicket>;

    /// Run a build on an acquired lane
    fn rebuild(&self, ticket: BuildTicket, request: BuildRequest) -> BoxFuture<'static, BuildStatus>;

    /// Run a full build, acquiring the lane itself
    fn build(&self, request: BuildRequest) -> BoxFuture<'static, BuildStatus>;

    /// Abort whatever runs on `lane`
    fn abort(&self, lane: Lane) -> bool;
}

impl HotRebuild for BuildPipeline {
    fn try_begin(&self, kind: BuildKind) -> Option<BuildTicket> {
        BuildPipeline::try_begin(self, kind)
    }

    fn rebuild(&self, ticket: BuildTicket, request: BuildRequest) -> BoxFuture<'static, BuildStatus> {
        let pipeline = self.clone();
        Box::pin(async move { pipeline.run_with_ticket(ticket, request).await })
    }

    fn build(&self, request: BuildRequest) -> BoxFuture<'static, BuildStatus> {
        let pipeline = self.clone();
        Box::pin(async move { pipeline.run(request).await })
    }

    fn abort(&self, lane: Lane) -> bool {
        BuildPipeline::abort(self, lane)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::global_config::GlobalConfig;
    use crate::test_utils::{
        pipeline_for, pipeline_with_settings, write_swift_package, RecordingSink, PURE_MANIFEST,
        SLOW_EMBEDDED_MANIFEST,
    };
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    const FAILING_MANIFEST: &str = r#"
[project]
name = "broken"
stream = "server"

[build]
targets = ["Server"]

[steps.resolve]
program = "sh"
args = ["-c", "mkdir -p {build_path}"]

[steps.compile]
program = "sh"
args = ["-c", "echo 'error: cannot find type' >&2; exit 3"]
"#;

    const NO_TARGETS_MANIFEST: &str = r#"
[project]
name = "library"
stream = "pure"

[steps.resolve]
program = "sh"
args = ["-c", "mkdir -p {build_path}"]

[steps.dump]
program = "sh"
args = ["-c", "echo '{\"targets\": []}'"]
"#;

    const WEB_MANIFEST: &str = r#"
[project]
name = "site"
stream = "web"

[build]
targets = ["App", "Service"]
service_worker_target = "Service"
required_packages = ["JavaScriptKit"]
gzip = true

[steps.resolve]
program = "sh"
args = ["-c", "mkdir -p {build_path}/checkouts/JavaScriptKit"]

[steps.compile]
program = "sh"
args = ["-c", "mkdir -p {build_path}/{mode} && touch {build_path}/{mode}/{target}.wasm"]

[steps.install]
program = "sh"
args = ["-c", "mkdir -p {web_sources}/node_modules"]

[[steps.assemble]]
label = "write index"
program = "sh"
args = ["-c", "echo index >> DevPublic/index.html"]
only_on_fresh_build = true
"#;

    fn web_project() -> TempDir {
        let dir = TempDir::new().unwrap();
        write_swift_package(dir.path());
        std::fs::create_dir_all(dir.path().join("WebSources")).unwrap();
        std::fs::write(dir.path().join("WebSources/package.json"), "{}\n").unwrap();
        dir
    }

    fn assert_no_executable_records(pipeline: &BuildPipeline) {
        for variant in ["native-debug", "wasi-debug"] {
            assert!(
                !pipeline
                    .freshness()
                    .is_recorded(ArtifactKind::SwiftSources, variant)
                    .unwrap(),
                "{variant}"
            );
        }
    }

    #[tokio::test]
    async fn test_web_build_fans_out_to_native_and_wasi() {
        let dir = web_project();
        let (pipeline, sink) = pipeline_for(dir.path(), WEB_MANIFEST, RecordingSink::new());

        let status = pipeline.run(BuildRequest::new(BuildKind::Debug)).await;

        assert!(status.is_success(), "{status:?}");
        let freshness = pipeline.freshness();
        for backend in ["native", "wasi"] {
            assert!(freshness
                .is_recorded(ArtifactKind::SwiftPackageManifest, backend)
                .unwrap());
            assert!(freshness
                .is_recorded(ArtifactKind::SwiftSources, &format!("{backend}-debug"))
                .unwrap());
            assert!(sink.has_log(&format!("Building `Service` for {backend}")));
        }
        assert!(freshness
            .is_recorded(ArtifactKind::DependencyLockfile, "debug")
            .unwrap());
        assert!(dir.path().join("WebSources/node_modules").is_dir());

        let output = dir.path().join("DevPublic");
        assert!(output.join("app.wasm").exists());
        assert!(output.join("service.wasm").exists());
        if ProcessExecutor::new().which("gzip").is_some() {
            assert!(sink.has_log("Awaiting compression"));
            assert!(output.join("app.wasm.gz").exists());
            assert!(output.join("service.wasm.gz").exists());
        }
        assert_eq!(std::fs::read_to_string(output.join("index.html")).unwrap(), "index\n");
    }

    #[tokio::test]
    async fn test_web_rebuild_skips_fresh_work() {
        let dir = web_project();
        let (pipeline, sink) = pipeline_for(dir.path(), WEB_MANIFEST, RecordingSink::new());
        assert!(pipeline.run(BuildRequest::new(BuildKind::Debug)).await.is_success());
        assert!(!sink.has_log("Web dependencies are up to date"));

        let status = pipeline.run(BuildRequest::new(BuildKind::Debug)).await;

        assert!(status.is_success(), "{status:?}");
        assert!(sink.has_log("Dependencies for wasi are up to date"));
        assert!(sink.has_log("Web dependencies are up to date"));
        assert!(sink.has_log("Skipping 'write index', already built once"));
        let index = dir.path().join("DevPublic/index.html");
        assert_eq!(std::fs::read_to_string(index).unwrap(), "index\n");
    }

    #[tokio::test]
    async fn test_failed_wasi_sibling_fails_web_build() {
        let dir = web_project();
        let manifest = WEB_MANIFEST.replace(
            "mkdir -p {build_path}/{mode} &&",
            "if [ {backend} = wasi ]; then echo 'wasm-ld: undefined symbol' >&2; exit 1; fi; mkdir -p {build_path}/{mode} &&",
        );
        let (pipeline, sink) = pipeline_for(dir.path(), &manifest, RecordingSink::new());

        let status = pipeline.run(BuildRequest::new(BuildKind::Debug)).await;

        let BuildStatus::Failed { error, .. } = &status else {
            panic!("expected failure, got {status:?}");
        };
        let rendered: serde_json::Value = serde_json::from_str(error).unwrap();
        assert!(rendered["stderr"].as_str().unwrap().contains("wasm-ld"));
        assert_no_executable_records(&pipeline);
        assert!(pipeline
            .freshness()
            .is_recorded(ArtifactKind::SwiftPackageManifest, "wasi")
            .unwrap());
        assert!(!dir.path().join("DevPublic/index.html").exists());
        assert_eq!(sink.statuses_with(StatusIcon::Error).len(), 1);
        assert!(sink.prompts().is_empty());
        assert!(!pipeline.lane(Lane::Debug).is_running());
    }

    #[tokio::test]
    async fn test_web_build_requires_checked_out_packages() {
        let dir = web_project();
        let manifest = WEB_MANIFEST.replace("{build_path}/checkouts/JavaScriptKit", "{build_path}");
        let (pipeline, sink) = pipeline_for(dir.path(), &manifest, RecordingSink::new());

        let status = pipeline.run(BuildRequest::new(BuildKind::Debug)).await;

        let BuildStatus::Failed { error, .. } = &status else {
            panic!("expected failure, got {status:?}");
        };
        assert_eq!(error, "Missing `JavaScriptKit` package");
        assert_eq!(sink.prompts(), vec!["Missing `JavaScriptKit` package"]);
        assert_no_executable_records(&pipeline);
    }

    #[tokio::test]
    async fn test_web_build_requires_service_worker_target() {
        let dir = web_project();
        let manifest = WEB_MANIFEST.replace(r#"targets = ["App", "Service"]"#, r#"targets = ["App"]"#);
        let (pipeline, sink) = pipeline_for(dir.path(), &manifest, RecordingSink::new());

        let status = pipeline.run(BuildRequest::new(BuildKind::Debug)).await;

        let BuildStatus::Failed { error, .. } = &status else {
            panic!("expected failure, got {status:?}");
        };
        assert_eq!(error, "`Service` target is missing in the Package.swift");
        assert_eq!(sink.prompts().len(), 1);
        assert!(!sink.has_log("Building `App` for wasi"));
        assert_no_executable_records(&pipeline);
    }

    #[tokio::test]
    async fn test_debug_build_records_freshness() {
        let dir = TempDir::new().unwrap();
        write_swift_package(dir.path());
        let (pipeline, sink) = pipeline_for(dir.path(), PURE_MANIFEST, RecordingSink::new());

        let status = pipeline.run(BuildRequest::new(BuildKind::Debug)).await;

        assert!(status.is_success(), "{status:?}");
        let freshness = pipeline.freshness();
        assert!(freshness
            .is_recorded(ArtifactKind::SwiftPackageManifest, "native")
            .unwrap());
        assert!(freshness
            .is_recorded(ArtifactKind::SwiftSources, "native-debug")
            .unwrap());
        assert!(!freshness
            .is_recorded(ArtifactKind::SwiftSources, "native-release")
            .unwrap());

        let checks = sink.statuses_with(StatusIcon::Check);
        assert_eq!(checks.len(), 1);
        assert!(checks[0].message.starts_with("Debug Build Succeeded in"));
        assert_eq!(sink.progress().last(), Some(&100));
        assert!(sink.has_log("Building `App` for native"));
        assert!(!pipeline.lane(Lane::Debug).is_running());
        assert!(sink.refreshes() >= 2);
    }

    #[tokio::test]
    async fn test_second_build_skips_resolve() {
        let dir = TempDir::new().unwrap();
        write_swift_package(dir.path());
        let (pipeline, sink) = pipeline_for(dir.path(), PURE_MANIFEST, RecordingSink::new());

        assert!(pipeline.run(BuildRequest::new(BuildKind::Debug)).await.is_success());
        assert!(!sink.has_log("Dependencies for native are up to date"));
        assert!(pipeline.run(BuildRequest::new(BuildKind::Debug)).await.is_success());
        assert!(sink.has_log("Dependencies for native are up to date"));

        let forced = BuildRequest::new(BuildKind::Debug).forced(true);
        let resolves_before = sink.logs().iter().filter(|l| *l == "Resolving native dependencies").count();
        assert!(pipeline.run(forced).await.is_success());
        let resolves_after = sink.logs().iter().filter(|l| *l == "Resolving native dependencies").count();
        assert_eq!(resolves_after, resolves_before + 1);
    }

    #[tokio::test]
    async fn test_incremental_build_skips_unchanged_executables() {
        let dir = TempDir::new().unwrap();
        write_swift_package(dir.path());
        let settings = BuildSettings {
            incremental: true,
            ..BuildSettings::default()
        };
        let (pipeline, sink) =
            pipeline_with_settings(dir.path(), PURE_MANIFEST, settings, RecordingSink::new());

        assert!(pipeline.run(BuildRequest::new(BuildKind::Debug)).await.is_success());
        assert!(!sink.has_log("native executables are up to date"));
        assert!(pipeline.run(BuildRequest::new(BuildKind::Debug)).await.is_success());
        assert!(sink.has_log("native executables are up to date"));
    }

    #[tokio::test]
    async fn test_failed_build_leaves_no_record() {
        let dir = TempDir::new().unwrap();
        write_swift_package(dir.path());
        let (pipeline, sink) = pipeline_for(dir.path(), FAILING_MANIFEST, RecordingSink::new());

        let status = pipeline.run(BuildRequest::new(BuildKind::Release)).await;

        let BuildStatus::Failed { error, .. } = &status else {
            panic!("expected failure, got {status:?}");
        };
        let rendered: serde_json::Value = serde_json::from_str(error).unwrap();
        assert_eq!(rendered["code"], 3);
        assert!(rendered["stderr"].as_str().unwrap().contains("cannot find type"));

        assert!(!pipeline
            .freshness()
            .is_recorded(ArtifactKind::SwiftSources, "native-release")
            .unwrap());
        let errors = sink.statuses_with(StatusIcon::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].severity, Severity::Error);
        assert!(errors[0].message.starts_with("Release Build Failed"));
        assert!(sink.prompts().is_empty());
        assert!(!pipeline.lane(Lane::Release).is_running());
    }

    #[tokio::test]
    async fn test_precondition_failure_offers_retry() {
        let dir = TempDir::new().unwrap();
        let (pipeline, sink) = pipeline_for(
            dir.path(),
            NO_TARGETS_MANIFEST,
            RecordingSink::new().with_retries([true]),
        );

        let status = pipeline.run(BuildRequest::new(BuildKind::Debug)).await;

        let BuildStatus::Failed { error, .. } = &status else {
            panic!("expected failure, got {status:?}");
        };
        assert_eq!(error, "No targets to build");
        assert_eq!(sink.prompts(), vec!["No targets to build", "No targets to build"]);
        assert_eq!(sink.statuses_with(StatusIcon::Error).len(), 2);
    }

    #[tokio::test]
    async fn test_abort_mid_build() {
        let dir = TempDir::new().unwrap();
        let (pipeline, sink) = pipeline_for(dir.path(), SLOW_EMBEDDED_MANIFEST, RecordingSink::new());

        let running = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.run(BuildRequest::new(BuildKind::Debug)).await })
        };
        while !pipeline.lane(Lane::Debug).is_running() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let aborted_at = Instant::now();
        assert!(pipeline.abort(Lane::Debug));
        let status = running.await.unwrap();

        assert!(status.is_aborted(), "{status:?}");
        assert!(aborted_at.elapsed() < Duration::from_secs(4));
        let aborts = sink.statuses_with(StatusIcon::CircleSlash);
        assert_eq!(aborts.len(), 1);
        assert!(aborts[0].message.starts_with("Aborted Debug Build after"));
        assert!(sink.statuses_with(StatusIcon::Check).is_empty());
        assert!(sink.statuses_with(StatusIcon::Error).is_empty());
        assert!(!pipeline.lane(Lane::Debug).is_running());
        assert!(!pipeline
            .freshness()
            .is_recorded(ArtifactKind::SwiftSources, "native-debug")
            .unwrap());
        assert!(!pipeline.abort(Lane::Debug));
    }

    #[tokio::test]
    async fn test_busy_lane_rejects() {
        let dir = TempDir::new().unwrap();
        let (pipeline, _sink) = pipeline_for(dir.path(), PURE_MANIFEST, RecordingSink::new());

        let ticket = pipeline.try_begin(BuildKind::Debug).unwrap();
        assert_eq!(
            pipeline.run(BuildRequest::new(BuildKind::HotStyle)).await,
            BuildStatus::Rejected
        );
        assert_eq!(
            pipeline.run(BuildRequest::new(BuildKind::Debug)).await,
            BuildStatus::Rejected
        );
        assert!(pipeline.try_begin(BuildKind::Release).is_some());
        drop(ticket);
        assert!(pipeline.try_begin(BuildKind::HotStyle).is_some());
    }

    #[tokio::test]
    async fn test_hot_swift_before_full_build_is_skipped() {
        let dir = TempDir::new().unwrap();
        let (pipeline, sink) = pipeline_for(dir.path(), PURE_MANIFEST, RecordingSink::new());

        let status = pipeline.run(BuildRequest::new(BuildKind::HotSwift)).await;

        let BuildStatus::Skipped { reason } = status else {
            panic!("expected skip, got {status:?}");
        };
        assert!(reason.contains("native"));
        assert!(sink.statuses_with(StatusIcon::Check).is_empty());
    }

    #[tokio::test]
    async fn test_hot_swift_after_full_build() {
        let dir = TempDir::new().unwrap();
        write_swift_package(dir.path());
        let (pipeline, sink) = pipeline_for(dir.path(), PURE_MANIFEST, RecordingSink::new());
        assert!(pipeline.run(BuildRequest::new(BuildKind::Debug)).await.is_success());

        let request = BuildRequest::new(BuildKind::HotSwift).with_target_hint(Some("App".into()));
        let status = pipeline.run(request).await;

        assert!(status.is_success(), "{status:?}");
        assert!(sink
            .statuses_with(StatusIcon::Check)
            .iter()
            .any(|s| s.message.starts_with("Hot Rebuild Swift")));
    }

    #[test]
    fn test_settings_precedence() {
        let mut manifest = Manifest::from_toml(PURE_MANIFEST).unwrap();
        let mut global = GlobalConfig::default();
        global.build.gzip = Some(true);
        global.build.brotli = Some(true);
        global.build.incremental = Some(true);
        manifest.build.brotli = Some(false);

        let settings = BuildSettings::resolve(&manifest, &global, CompressionFlags::default());
        assert!(settings.compression.gzip_enabled());
        assert!(!settings.compression.brotli_enabled());
        assert!(settings.incremental);

        let flags = CompressionFlags {
            compress: true,
            no_compress: false,
        };
        let settings = BuildSettings::resolve(&manifest, &global, flags);
        assert!(settings.compression.brotli_enabled());

        let flags = CompressionFlags {
            compress: true,
            no_compress: true,
        };
        let settings = BuildSettings::resolve(&manifest, &global, flags);
        assert!(!settings.compression.is_enabled());
    }
}
