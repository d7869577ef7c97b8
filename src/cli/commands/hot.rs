//! Hot command implementation
//!
//! Implements `swiftstream hot`, the host side of an external file watcher.
//! Every stdin line is one of:
//!
//! - a JSON change event `{"path": "...", "content": "...", "kind": "...", "target": "..."}`
//!   where only `path` is required
//! - `build` to run a full debug build
//! - `abort` to abort the running debug build and drop deferred rebuilds

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;

use super::Session;
use crate::cli::output::ConsoleSink;
use crate::core::hot_rebuild::{classify, Coalescer, HotRebuildRequest, Submission};
use crate::core::kind::BuildKind;
use crate::core::pipeline::{BuildPipeline, BuildRequest, CompressionFlags};
use crate::core::report::{LogLevel, StatusSink};

/// A file change reported by the watcher
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Changed file, absolute or relative to the project
    pub path: PathBuf,
    /// New content; read from disk when absent
    #[serde(default)]
    pub content: Option<String>,
    /// Hot kind; classified from the path when absent
    #[serde(default)]
    pub kind: Option<String>,
    /// Executable to narrow a Swift rebuild to
    #[serde(default)]
    pub target: Option<String>,
}

/// A parsed stdin line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    Abort,
    Build,
    Change(ChangeEvent),
}

impl HostCommand {
    /// Parse one line; blank lines yield `None`
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        match line {
            "" => Ok(None),
            "abort" => Ok(Some(Self::Abort)),
            "build" => Ok(Some(Self::Build)),
            _ => {
                let event = serde_json::from_str(line)
                    .with_context(|| format!("Invalid change event: {line}"))?;
                Ok(Some(Self::Change(event)))
            }
        }
    }
}

/// Turn a change event into a rebuild request
///
/// Returns `None` for paths that do not trigger a rebuild.
pub async fn request_for(
    root: &Path,
    web_sources: &str,
    event: ChangeEvent,
) -> Result<Option<HotRebuildRequest>> {
    let path = if event.path.is_absolute() {
        event.path
    } else {
        root.join(event.path)
    };

    let (kind, hint) = match event.kind {
        Some(kind) => {
            let kind: BuildKind = kind.parse().map_err(anyhow::Error::msg)?;
            (kind, None)
        }
        None => match classify(root, web_sources, &path) {
            Some(classified) => classified,
            None => return Ok(None),
        },
    };

    let content = match event.content {
        Some(content) => content.into_bytes(),
        None => tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
    };

    Ok(Some(
        HotRebuildRequest::new(kind, path, &content).with_target_hint(event.target.or(hint)),
    ))
}

/// Execute the hot command
pub async fn execute(session: &Session) -> Result<()> {
    let manifest = session.manifest()?;
    let global = session.global_config();
    let web_sources = manifest.build.web_sources.clone();
    let output = session.output;

    let sink: Arc<dyn StatusSink> = Arc::new(ConsoleSink::non_interactive(
        output,
        session.log_level(&global),
    ));
    let pipeline = session.pipeline(manifest, &global, CompressionFlags::default(), Arc::clone(&sink));
    let coalescer: Arc<Coalescer<BuildPipeline>> =
        Arc::new(Coalescer::new(Arc::new(pipeline)).with_enabled(global.hot_rebuild_enabled()));

    tracing::info!("Waiting for change events on stdin");
    let mut tasks = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read events from stdin")?
    {
        let command = match HostCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!("{e:#}");
                continue;
            }
        };

        match command {
            HostCommand::Abort => {
                if !coalescer.abort() {
                    sink.log("Nothing to abort", LogLevel::Detailed);
                }
            }
            HostCommand::Build => {
                let coalescer = Arc::clone(&coalescer);
                tasks.spawn(async move {
                    coalescer.build(BuildRequest::new(BuildKind::Debug)).await;
                });
            }
            HostCommand::Change(event) => {
                let request = match request_for(&session.project_dir, &web_sources, event).await {
                    Ok(Some(request)) => request,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::warn!("{e:#}");
                        continue;
                    }
                };
                let coalescer = Arc::clone(&coalescer);
                let sink = Arc::clone(&sink);
                tasks.spawn(async move {
                    let kind = request.kind;
                    let submission = coalescer.submit(request).await;
                    report(output.json, sink.as_ref(), kind, &submission);
                });
            }
        }

        while let Some(finished) = tasks.try_join_next() {
            log_join(finished);
        }
    }

    while let Some(finished) = tasks.join_next().await {
        log_join(finished);
    }
    Ok(())
}

fn report(json: bool, sink: &dyn StatusSink, kind: BuildKind, submission: &Submission) {
    if json {
        let outcome = match submission {
            Submission::Ran(status) => json!({ "event": "hot", "kind": kind.as_str(), "ran": status }),
            Submission::Deferred { replaced } => {
                json!({ "event": "hot", "kind": kind.as_str(), "deferred": true, "replaced": replaced })
            }
            Submission::Dropped(reason) => {
                json!({ "event": "hot", "kind": kind.as_str(), "dropped": format!("{reason:?}").to_lowercase() })
            }
        };
        println!("{outcome}");
        return;
    }
    match submission {
        Submission::Ran(status) => sink.log(&format!("{} {status}", kind.title()), LogLevel::Detailed),
        Submission::Deferred { .. } => sink.log(&format!("{} deferred", kind.title()), LogLevel::Detailed),
        Submission::Dropped(reason) => {
            sink.log(&format!("{} dropped ({reason:?})", kind.title()), LogLevel::Verbose);
        }
    }
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        tracing::error!("Hot rebuild task failed: {e}");
    }
}
