//! Phase implementations
//!
//! Every phase returns early, without error, once the build's abort handle
//! is cancelled. Freshness records are only written after the guarded
//! work finished and the build was not cancelled.

use crate::config::defaults::{WEB_PACKAGE_JSON, WEB_SOURCE_EXTENSIONS};
use crate::core::compress::{CompressionJobs, Compressor};
use crate::core::freshness::FreshnessTarget;
use crate::core::kind::{ArtifactKind, Backend, BuildKind, BuildMode};
use crate::core::manifest::{ListedStep, Placeholders, StepCommand};
use crate::core::pipeline::{BuildPipeline, BuildRequest};
use crate::core::profile::{default_step, Phase, StepName, StreamKind, StreamProfile};
use crate::core::report::LogLevel;
use crate::core::state::BuildTicket;
use crate::core::targets::{executables_from_dump, select_targets};
use crate::core::task_runner::{QueuedCommand, TaskRunner};
use crate::error::BuildError;
use crate::infra::filesystem;
use crate::infra::process::{Invocation, ProcessResult, ProgramLocator};

/// How a build ended, short of an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    Completed,
    Skipped(String),
}

/// Phases a request runs
pub(crate) fn plan(profile: &StreamProfile, kind: BuildKind) -> Vec<Phase> {
    match kind {
        BuildKind::Debug | BuildKind::Release => profile.phases.clone(),
        BuildKind::HotSwift => vec![Phase::Targets, Phase::Executables, Phase::AwaitCompression],
        BuildKind::HotStyle => vec![Phase::Styles],
        BuildKind::HotScript => vec![Phase::WebSources],
        BuildKind::HotMarkup => vec![Phase::Markup, Phase::Assemble],
    }
}

/// Per-invocation state shared by the phases
pub(crate) struct BuildContext<'a> {
    ticket: &'a BuildTicket,
    kind: BuildKind,
    mode: BuildMode,
    force: bool,
    /// No executables were recorded for this mode when the build started
    fresh_build: bool,
    target_hint: Option<String>,
    runner: TaskRunner,
    targets: Vec<String>,
    compression: CompressionJobs,
}

impl<'a> BuildContext<'a> {
    pub(crate) fn new(
        ticket: &'a BuildTicket,
        request: &BuildRequest,
        runner: TaskRunner,
        fresh_build: bool,
    ) -> Self {
        Self {
            ticket,
            kind: request.kind,
            mode: request.kind.mode(),
            force: request.force,
            fresh_build,
            target_hint: request.target_hint.clone(),
            runner,
            targets: Vec::new(),
            compression: CompressionJobs::new(),
        }
    }

    fn cancelled(&self) -> bool {
        self.ticket.is_cancelled()
    }
}

impl BuildPipeline {
    pub(crate) async fn run_phase(
        &self,
        cx: &mut BuildContext<'_>,
        phase: Phase,
    ) -> Result<(), BuildError> {
        match phase {
            Phase::Resolve => self.resolve(cx).await,
            Phase::RequiredPackages => self.required_packages(),
            Phase::Targets => self.targets(cx).await,
            Phase::Executables => self.executables(cx).await,
            Phase::WebDependencies => self.web_dependencies(cx).await,
            Phase::WebSources => self.web_sources(cx).await,
            Phase::Styles => self.optional_step(cx, StepName::Styles).await,
            Phase::Markup => self.optional_step(cx, StepName::Markup).await,
            Phase::Assemble => {
                let steps = self.inner.manifest.steps.assemble.clone();
                self.run_listed(cx, &steps).await
            }
            Phase::PreBuild => {
                let steps = self.inner.manifest.steps.pre_build.clone();
                self.run_listed(cx, &steps).await
            }
            Phase::BuildCommands => self.build_commands(cx).await,
            Phase::AwaitCompression => {
                if cx.compression.spawned() > 0 {
                    self.inner.sink.log("Awaiting compression", LogLevel::Detailed);
                }
                cx.compression.wait(cx.ticket.abort_handle()).await
            }
        }
    }

    /// Manifest override, else the built-in command
    fn step(&self, name: StepName, backend: Backend) -> Option<StepCommand> {
        self.inner
            .manifest
            .steps
            .get(name)
            .cloned()
            .or_else(|| default_step(name, backend))
    }

    fn placeholders(&self, cx: &BuildContext<'_>, backend: Backend, target: Option<&str>) -> Placeholders {
        let paths = &self.inner.paths;
        let web_sources = paths.root().join(&self.inner.manifest.build.web_sources);
        let mut vars = Placeholders::new()
            .with("mode", cx.mode.as_str())
            .with("backend", backend.as_str())
            .with("build_path", paths.backend_build_dir(backend).display().to_string())
            .with("web_sources", web_sources.display().to_string());
        if let Some(target) = target {
            vars = vars.with("target", target);
        }
        vars
    }

    /// Run a command directly, killing it if the build is aborted
    async fn exec(&self, cx: &BuildContext<'_>, command: QueuedCommand) -> Result<ProcessResult, BuildError> {
        self.inner.sink.log(
            &format!("🧰 {} {}", command.program, command.args.join(" ")),
            LogLevel::Verbose,
        );
        let invocation = Invocation::new(ProgramLocator::parse(&command.program))
            .args(command.args)
            .cwd(self.inner.paths.root())
            .envs(&command.env)
            .describe(command.label);
        let token = cx.ticket.abort_handle().token();
        Ok(self
            .inner
            .executor
            .execute_cancellable(&invocation, &token)
            .await?)
    }

    async fn resolve(&self, cx: &BuildContext<'_>) -> Result<(), BuildError> {
        let paths = &self.inner.paths;
        let package_manifest = paths.package_manifest();

        for backend in &self.inner.profile.backends {
            if cx.cancelled() {
                return Ok(());
            }
            let variant = backend.as_str();
            let needed = cx.force
                || !paths.backend_build_dir(*backend).exists()
                || self.inner.freshness.is_stale(
                    ArtifactKind::SwiftPackageManifest,
                    variant,
                    FreshnessTarget::path(&package_manifest),
                )?;
            if !needed {
                self.inner.sink.log(
                    &format!("Dependencies for {backend} are up to date"),
                    LogLevel::Detailed,
                );
                continue;
            }
            let Some(step) = self.step(StepName::Resolve, *backend) else {
                continue;
            };

            self.inner
                .sink
                .log(&format!("Resolving {backend} dependencies"), LogLevel::Normal);
            let vars = self.placeholders(cx, *backend, None);
            self.exec(cx, step.to_command(format!("resolve {backend} dependencies"), &vars))
                .await?;
            if cx.cancelled() {
                return Ok(());
            }
            self.inner
                .freshness
                .mark_fresh(ArtifactKind::SwiftPackageManifest, variant)?;
        }
        Ok(())
    }

    fn required_packages(&self) -> Result<(), BuildError> {
        let paths = &self.inner.paths;
        let missing: Vec<&str> = self
            .inner
            .manifest
            .build
            .required_packages
            .iter()
            .filter(|name| {
                self.inner
                    .profile
                    .backends
                    .iter()
                    .any(|backend| !paths.checkout_dir(*backend, name).exists())
            })
            .map(String::as_str)
            .collect();

        match missing.len() {
            0 => Ok(()),
            1 => Err(BuildError::Precondition(format!("Missing `{}` package", missing[0]))),
            _ => Err(BuildError::Precondition(format!(
                "Missing `{}` packages",
                missing.join("`, `")
            ))),
        }
    }

    async fn targets(&self, cx: &mut BuildContext<'_>) -> Result<(), BuildError> {
        let build = &self.inner.manifest.build;
        let targets = if build.targets.is_empty() {
            let Some(step) = self.step(StepName::Dump, Backend::Native) else {
                return Err(BuildError::Precondition("No targets to build".to_string()));
            };
            let vars = self.placeholders(cx, Backend::Native, None);
            let result = self.exec(cx, step.to_command("dump package", &vars)).await?;
            if cx.cancelled() {
                return Ok(());
            }
            executables_from_dump(&result.stdout)?
        } else {
            build.targets.clone()
        };

        if targets.is_empty() {
            return Err(BuildError::Precondition("No targets to build".to_string()));
        }
        if self.inner.profile.stream == StreamKind::Web {
            let required = std::iter::once(&build.app_target).chain(&build.service_worker_target);
            for target in required {
                if !targets.contains(target) {
                    return Err(BuildError::Precondition(format!(
                        "`{target}` target is missing in the Package.swift"
                    )));
                }
            }
        }

        cx.targets = select_targets(&targets, cx.target_hint.as_deref());
        self.inner.sink.log(
            &format!("Targets: {}", cx.targets.join(", ")),
            LogLevel::Verbose,
        );
        Ok(())
    }

    async fn executables(&self, cx: &BuildContext<'_>) -> Result<(), BuildError> {
        let backends = &self.inner.profile.backends;
        let builds = backends
            .iter()
            .map(|backend| self.build_backend(cx, *backend));
        futures::future::try_join_all(builds).await?;

        if cx.cancelled() {
            return Ok(());
        }
        for backend in backends {
            self.inner
                .freshness
                .mark_fresh(ArtifactKind::SwiftSources, &format!("{backend}-{}", cx.mode))?;
        }
        Ok(())
    }

    /// One sibling of the executable fan-out
    async fn build_backend(&self, cx: &BuildContext<'_>, backend: Backend) -> Result<(), BuildError> {
        if self.inner.settings.incremental && !cx.force && !cx.kind.is_hot() {
            let variant = format!("{backend}-{}", cx.mode);
            let paths = &self.inner.paths;
            let freshness = &self.inner.freshness;
            let package_manifest = paths.package_manifest();
            let sources = paths.sources_dir();
            let stale = freshness.is_stale(
                ArtifactKind::SwiftSources,
                &variant,
                FreshnessTarget::path(&package_manifest),
            )? || freshness.is_stale(
                ArtifactKind::SwiftSources,
                &variant,
                FreshnessTarget::tree(&sources).with_extensions(&["swift"]),
            )?;
            if !stale {
                self.inner.sink.log(
                    &format!("{backend} executables are up to date"),
                    LogLevel::Detailed,
                );
                return Ok(());
            }
        }

        let Some(step) = self.step(StepName::Compile, backend) else {
            return Ok(());
        };
        for target in &cx.targets {
            if cx.cancelled() {
                return Ok(());
            }
            self.inner
                .sink
                .log(&format!("Building `{target}` for {backend}"), LogLevel::Normal);
            let vars = self.placeholders(cx, backend, Some(target));
            self.exec(cx, step.to_command(format!("build {target} for {backend}"), &vars))
                .await?;
            if cx.cancelled() {
                return Ok(());
            }
            if backend == Backend::Wasi && self.inner.profile.process_wasm {
                self.process_wasm(cx, target)?;
            }
        }
        Ok(())
    }

    /// Copy a wasm artifact to the output folder and start compressing it
    fn process_wasm(&self, cx: &BuildContext<'_>, target: &str) -> Result<(), BuildError> {
        let paths = &self.inner.paths;
        let artifact = paths
            .backend_build_dir(Backend::Wasi)
            .join(cx.mode.as_str())
            .join(format!("{target}.wasm"));
        if !artifact.exists() {
            return Err(BuildError::Message(
                "Unable to process WASM files, seems swift project hasn't been built".to_string(),
            ));
        }

        let output_dir = paths.output_dir(cx.mode);
        filesystem::create_dir_all(&output_dir).map_err(|e| BuildError::Io {
            path: output_dir.clone(),
            error: e.to_string(),
        })?;
        let destination = output_dir.join(format!("{}.wasm", target.to_lowercase()));
        std::fs::copy(&artifact, &destination).map_err(|e| BuildError::Io {
            path: destination.clone(),
            error: e.to_string(),
        })?;
        self.inner.sink.log(
            &format!("🧮 Processed {}", destination.display()),
            LogLevel::Detailed,
        );

        let compression = &self.inner.settings.compression;
        for (enabled, compressor) in [
            (compression.gzip_enabled(), Compressor::Gzip),
            (compression.brotli_enabled(), Compressor::Brotli),
        ] {
            if enabled {
                cx.compression
                    .spawn(&self.inner.executor, compressor, &destination, cx.mode);
            }
        }
        Ok(())
    }

    async fn web_dependencies(&self, cx: &BuildContext<'_>) -> Result<(), BuildError> {
        let web = self.inner.paths.root().join(&self.inner.manifest.build.web_sources);
        let package_json = web.join(WEB_PACKAGE_JSON);
        if !package_json.exists() {
            self.inner
                .sink
                .log("No package.json, skipping web dependencies", LogLevel::Verbose);
            return Ok(());
        }

        let variant = cx.mode.as_str();
        let needed = cx.force
            || !web.join("node_modules").exists()
            || self.inner.freshness.is_stale(
                ArtifactKind::DependencyLockfile,
                variant,
                FreshnessTarget::path(&package_json),
            )?;
        if !needed {
            self.inner
                .sink
                .log("Web dependencies are up to date", LogLevel::Detailed);
            return Ok(());
        }
        let Some(step) = self.step(StepName::Install, Backend::Native) else {
            return Ok(());
        };

        let vars = self.placeholders(cx, Backend::Native, None);
        self.exec(cx, step.to_command("install web dependencies", &vars))
            .await?;
        if cx.cancelled() {
            return Ok(());
        }
        self.inner
            .freshness
            .mark_fresh(ArtifactKind::DependencyLockfile, variant)?;
        Ok(())
    }

    async fn web_sources(&self, cx: &BuildContext<'_>) -> Result<(), BuildError> {
        let web = self.inner.paths.root().join(&self.inner.manifest.build.web_sources);
        let variant = cx.mode.as_str();
        let needed = !cx.kind.is_hot()
            || cx.force
            || self.inner.freshness.is_stale(
                ArtifactKind::WebSources,
                variant,
                FreshnessTarget::tree(&web).with_extensions(WEB_SOURCE_EXTENSIONS),
            )?;
        if !needed {
            self.inner.sink.log("Web sources are up to date", LogLevel::Detailed);
            return Ok(());
        }
        let Some(step) = self.step(StepName::Bundle, Backend::Native) else {
            self.inner
                .sink
                .log("No bundle step configured, skipping", LogLevel::Verbose);
            return Ok(());
        };

        let vars = self.placeholders(cx, Backend::Native, None);
        self.exec(cx, step.to_command("bundle web sources", &vars))
            .await?;
        if cx.cancelled() {
            return Ok(());
        }
        self.inner.freshness.mark_fresh(ArtifactKind::WebSources, variant)?;
        Ok(())
    }

    async fn optional_step(&self, cx: &BuildContext<'_>, name: StepName) -> Result<(), BuildError> {
        let Some(step) = self.step(name, Backend::Native) else {
            self.inner.sink.log(
                &format!("No {} step configured, skipping", name.as_str()),
                LogLevel::Verbose,
            );
            return Ok(());
        };
        let vars = self.placeholders(cx, Backend::Native, None);
        self.exec(cx, step.to_command(name.as_str(), &vars)).await?;
        Ok(())
    }

    async fn build_commands(&self, cx: &BuildContext<'_>) -> Result<(), BuildError> {
        let steps = self.inner.manifest.steps.build.clone();
        self.run_listed(cx, &steps).await?;
        if cx.cancelled() || steps.is_empty() {
            return Ok(());
        }
        let variant = format!("{}-{}", self.inner.profile.primary_backend(), cx.mode);
        self.inner
            .freshness
            .mark_fresh(ArtifactKind::SwiftSources, &variant)?;
        Ok(())
    }

    /// Ordered steps on the lane's task runner
    async fn run_listed(&self, cx: &BuildContext<'_>, steps: &[ListedStep]) -> Result<(), BuildError> {
        if steps.is_empty() {
            return Ok(());
        }
        let backend = self.inner.profile.primary_backend();

        for step in steps {
            if cx.cancelled() {
                return Ok(());
            }
            if step.only_on_fresh_build && !cx.fresh_build {
                self.inner.sink.log(
                    &format!("Skipping '{}', already built once", step.label),
                    LogLevel::Verbose,
                );
                continue;
            }
            self.inner.sink.log(&step.label, LogLevel::Detailed);
            let vars = self.placeholders(cx, backend, None);
            let command = step.command.to_command(step.label.clone(), &vars);
            if !cx.runner.enqueue(command).await {
                if cx.cancelled() {
                    return Ok(());
                }
                return Err(BuildError::Step {
                    label: step.label.clone(),
                });
            }
        }
        Ok(())
    }
}
