//! Stream profiles
//!
//! Each kind of project ("stream") is a value: the ordered list of phases
//! a full build runs and the backends executables are built for. There
//! is one pipeline engine; streams only change its parameters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::kind::Backend;
use crate::core::manifest::StepCommand;

/// Kind of project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Pure,
    Server,
    Web,
    Embedded,
    Android,
}

impl StreamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pure => "pure",
            Self::Server => "server",
            Self::Web => "web",
            Self::Embedded => "embedded",
            Self::Android => "android",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pure" => Ok(Self::Pure),
            "server" => Ok(Self::Server),
            "web" => Ok(Self::Web),
            "embedded" => Ok(Self::Embedded),
            "android" => Ok(Self::Android),
            other => Err(format!("Unknown stream '{other}'")),
        }
    }
}

/// One step of a full build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Resolve Swift package dependencies per backend
    Resolve,
    /// Verify companion package checkouts
    RequiredPackages,
    /// Determine the executable targets
    Targets,
    /// Build executables, one sibling per backend
    Executables,
    /// Install web dependencies
    WebDependencies,
    /// Bundle web sources
    WebSources,
    /// Compile stylesheets
    Styles,
    /// Render HTML
    Markup,
    /// Ordered assemble steps
    Assemble,
    /// Join background compression jobs
    AwaitCompression,
    /// Ordered pre-build steps
    PreBuild,
    /// Ordered build steps
    BuildCommands,
}

impl Phase {
    /// Status line shown while the phase runs
    pub fn title(self) -> &'static str {
        match self {
            Self::Resolve => "Resolving dependencies",
            Self::RequiredPackages => "Checking required packages",
            Self::Targets => "Looking up targets",
            Self::Executables => "Building executables",
            Self::WebDependencies => "Installing web dependencies",
            Self::WebSources => "Bundling web sources",
            Self::Styles => "Compiling styles",
            Self::Markup => "Rendering markup",
            Self::Assemble => "Assembling output",
            Self::AwaitCompression => "Awaiting compression",
            Self::PreBuild => "Preparing build",
            Self::BuildCommands => "Running build commands",
        }
    }
}

/// Phases and backends of a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamProfile {
    /// The stream this profile describes
    pub stream: StreamKind,
    /// Phases of a full build, in order
    pub phases: Vec<Phase>,
    /// Backends of the executable fan-out
    pub backends: Vec<Backend>,
    /// Copy wasm artifacts into the output folder and compress them
    pub process_wasm: bool,
}

impl StreamProfile {
    pub fn for_stream(stream: StreamKind) -> Self {
        use Phase::{
            Assemble, AwaitCompression, BuildCommands, Executables, Markup, PreBuild,
            RequiredPackages, Resolve, Styles, Targets, WebDependencies, WebSources,
        };

        let (phases, backends, process_wasm) = match stream {
            StreamKind::Pure | StreamKind::Server => (
                vec![Resolve, Targets, Executables],
                vec![Backend::Native],
                false,
            ),
            StreamKind::Web => (
                vec![
                    Resolve,
                    RequiredPackages,
                    Targets,
                    Executables,
                    WebDependencies,
                    WebSources,
                    Styles,
                    Markup,
                    Assemble,
                    AwaitCompression,
                ],
                vec![Backend::Native, Backend::Wasi],
                true,
            ),
            StreamKind::Embedded => (vec![PreBuild, BuildCommands], vec![Backend::Native], false),
            StreamKind::Android => (
                vec![Resolve, Targets, Executables, Assemble],
                vec![Backend::Android],
                false,
            ),
        };

        Self {
            stream,
            phases,
            backends,
            process_wasm,
        }
    }

    /// Replace the backend fan-out
    #[must_use]
    pub fn with_backends(mut self, backends: Vec<Backend>) -> Self {
        if !backends.is_empty() {
            self.backends = backends;
        }
        self
    }

    pub fn has_phase(&self, phase: Phase) -> bool {
        self.phases.contains(&phase)
    }

    /// Backend whose records gate `only_on_fresh_build` steps
    pub fn primary_backend(&self) -> Backend {
        self.backends.first().copied().unwrap_or(Backend::Native)
    }
}

/// Single-command steps that can be overridden in the manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepName {
    Resolve,
    Dump,
    Compile,
    Install,
    Bundle,
    Styles,
    Markup,
}

impl StepName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resolve => "resolve",
            Self::Dump => "dump",
            Self::Compile => "compile",
            Self::Install => "install",
            Self::Bundle => "bundle",
            Self::Styles => "styles",
            Self::Markup => "markup",
        }
    }
}

/// Built-in command for a step, if there is one
///
/// Arguments may contain `{target}`, `{mode}`, `{backend}`,
/// `{build_path}` and `{web_sources}` placeholders.
pub fn default_step(step: StepName, backend: Backend) -> Option<StepCommand> {
    let args: Vec<&str> = match step {
        StepName::Resolve => vec!["package", "resolve", "--build-path", "{build_path}"],
        StepName::Dump => vec!["package", "dump-package"],
        StepName::Compile => {
            let mut args = vec![
                "build",
                "-c",
                "{mode}",
                "--product",
                "{target}",
                "--build-path",
                "{build_path}",
            ];
            args.extend(backend_build_args(backend));
            args
        }
        StepName::Install => {
            return Some(StepCommand::new("npm", ["install", "--prefix", "{web_sources}"]));
        }
        StepName::Bundle | StepName::Styles | StepName::Markup => return None,
    };
    Some(StepCommand::new("swift", args))
}

fn backend_build_args(backend: Backend) -> &'static [&'static str] {
    match backend {
        Backend::Native => &[],
        Backend::Wasi => &[
            "--swift-sdk",
            "wasm32-unknown-wasi",
            "--static-swift-stdlib",
            "-Xswiftc",
            "-Xclang-linker",
            "-Xswiftc",
            "-mexec-model=reactor",
            "-Xlinker",
            "--export-if-defined=__main_argc_argv",
        ],
        Backend::Android => &["--swift-sdk", "aarch64-unknown-linux-android24"],
    }
}
