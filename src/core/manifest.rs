//! Manifest (swiftstream.toml) parsing and validation
//!
//! The manifest names the stream, tunes the build and optionally
//! overrides the commands individual phases run.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::defaults::{DEFAULT_APP_TARGET, DEFAULT_WEB_SOURCES, MANIFEST_FILE};
use crate::core::kind::Backend;
use crate::core::profile::{StepName, StreamKind};
use crate::core::task_runner::QueuedCommand;
use crate::error::ManifestError;

/// The project manifest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    /// Project configuration
    pub project: ProjectConfig,

    /// Build configuration
    #[serde(default)]
    pub build: BuildConfig,

    /// Command overrides
    #[serde(default)]
    pub steps: StepsConfig,
}

/// Project-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Kind of project
    pub stream: StreamKind,
}

/// Build configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildConfig {
    /// Executable targets; discovered from the package when empty
    #[serde(default)]
    pub targets: Vec<String>,

    /// Web app target
    #[serde(default = "default_app_target")]
    pub app_target: String,

    /// Web service worker target
    #[serde(default)]
    pub service_worker_target: Option<String>,

    /// Override of the stream's backend fan-out
    #[serde(default)]
    pub backends: Vec<Backend>,

    /// Skip executable builds whose sources are unchanged
    #[serde(default)]
    pub incremental: Option<bool>,

    /// Companion packages that must be checked out after resolution
    #[serde(default)]
    pub required_packages: Vec<String>,

    /// Web sources folder
    #[serde(default = "default_web_sources")]
    pub web_sources: String,

    /// Gzip wasm artifacts
    #[serde(default)]
    pub gzip: Option<bool>,

    /// Brotli wasm artifacts
    #[serde(default)]
    pub brotli: Option<bool>,
}

fn default_app_target() -> String {
    DEFAULT_APP_TARGET.to_string()
}

fn default_web_sources() -> String {
    DEFAULT_WEB_SOURCES.to_string()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            app_target: default_app_target(),
            service_worker_target: None,
            backends: Vec::new(),
            incremental: None,
            required_packages: Vec::new(),
            web_sources: default_web_sources(),
            gzip: None,
            brotli: None,
        }
    }
}

/// A single external command
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepCommand {
    /// Program path or bare name
    pub program: String,

    /// Arguments, with placeholders
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl StepCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: HashMap::new(),
        }
    }

    /// Expand placeholders into a runnable command
    pub fn to_command(&self, label: impl Into<String>, vars: &Placeholders) -> QueuedCommand {
        QueuedCommand::new(label, vars.expand(&self.program))
            .with_args(self.args.iter().map(|arg| vars.expand(arg)))
            .with_env(
                self.env
                    .iter()
                    .map(|(k, v)| (k.clone(), vars.expand(v)))
                    .collect(),
            )
    }
}

/// An entry of an ordered step list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListedStep {
    /// Name shown in logs and failure messages
    pub label: String,

    /// The command
    #[serde(flatten)]
    pub command: StepCommand,

    /// Only run before the first successful build
    #[serde(default)]
    pub only_on_fresh_build: bool,
}

/// Command overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StepsConfig {
    #[serde(default)]
    pub resolve: Option<StepCommand>,
    #[serde(default)]
    pub dump: Option<StepCommand>,
    #[serde(default)]
    pub compile: Option<StepCommand>,
    #[serde(default)]
    pub install: Option<StepCommand>,
    #[serde(default)]
    pub bundle: Option<StepCommand>,
    #[serde(default)]
    pub styles: Option<StepCommand>,
    #[serde(default)]
    pub markup: Option<StepCommand>,

    /// Run before the build steps
    #[serde(default)]
    pub pre_build: Vec<ListedStep>,

    /// Main build steps of command-driven streams
    #[serde(default)]
    pub build: Vec<ListedStep>,

    /// Run after executables are built
    #[serde(default)]
    pub assemble: Vec<ListedStep>,
}

impl StepsConfig {
    /// The configured override of a single-command step
    pub fn get(&self, step: StepName) -> Option<&StepCommand> {
        match step {
            StepName::Resolve => self.resolve.as_ref(),
            StepName::Dump => self.dump.as_ref(),
            StepName::Compile => self.compile.as_ref(),
            StepName::Install => self.install.as_ref(),
            StepName::Bundle => self.bundle.as_ref(),
            StepName::Styles => self.styles.as_ref(),
            StepName::Markup => self.markup.as_ref(),
        }
    }
}

/// Values substituted into `{name}` placeholders
#[derive(Debug, Clone, Default)]
pub struct Placeholders {
    values: Vec<(&'static str, String)>,
}

impl Placeholders {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.values.retain(|(n, _)| *n != name);
        self.values.push((name, value.into()));
        self
    }

    /// Replace every known `{name}`; unknown placeholders stay as they are
    pub fn expand(&self, template: &str) -> String {
        let mut expanded = template.to_string();
        for (name, value) in &self.values {
            expanded = expanded.replace(&format!("{{{name}}}"), value);
        }
        expanded
    }
}

impl Manifest {
    /// Load the manifest of the project at `root`
    pub fn load(root: &Path) -> Result<Self, ManifestError> {
        let path = root.join(MANIFEST_FILE);
        if !path.exists() {
            return Err(ManifestError::NotFound { path });
        }
        let content = std::fs::read_to_string(&path).map_err(|e| ManifestError::Read {
            path: path.clone(),
            error: e.to_string(),
        })?;
        let manifest = Self::from_toml(&content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parse manifest from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ManifestError> {
        toml::from_str(content).map_err(|e| ManifestError::Parse(e.to_string()))
    }

    /// Check values serde cannot
    ///
    /// All problems are reported at once.
    pub fn validate(&self) -> Result<(), ManifestError> {
        let mut errors = Vec::new();

        if self.project.name.trim().is_empty() {
            errors.push("Field 'project.name' cannot be empty".to_string());
        }
        if self.build.targets.iter().any(|t| t.trim().is_empty()) {
            errors.push("Field 'build.targets' cannot contain empty names".to_string());
        }
        if self.project.stream == StreamKind::Web && self.build.app_target.trim().is_empty() {
            errors.push("Field 'build.app_target' cannot be empty".to_string());
        }
        for step in self
            .steps
            .pre_build
            .iter()
            .chain(&self.steps.build)
            .chain(&self.steps.assemble)
        {
            if step.command.program.trim().is_empty() {
                errors.push(format!("Step '{}' has no program", step.label));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ManifestError::Invalid(errors.join("; ")))
        }
    }
}
