//! Hot-rebuild coalescing
//!
//! File-save events arrive far more often than rebuilds are useful. The
//! [`Coalescer`] drops events whose content did not change, defers events
//! that arrive while the debug lane is busy and replays one deferred
//! request after each completed build.
//!
//! There is at most one deferred request per kind: a newer request of the
//! same kind replaces the pending one, so a burst of saves during a long
//! build collapses into a single trailing rebuild using the latest content.
//! When the two requests name different targets the survivor rebuilds all
//! targets.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::defaults::{PACKAGE_MANIFEST, SOURCES_DIR};
use crate::core::checksum::content_checksum;
use crate::core::kind::{BuildKind, Lane};
use crate::core::pipeline::{BuildRequest, HotRebuild};
use crate::core::report::BuildStatus;
use crate::core::state::BuildTicket;

/// A rebuild triggered by a changed resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotRebuildRequest {
    /// One of the hot kinds
    pub kind: BuildKind,
    /// Executable the change belongs to
    pub target_hint: Option<String>,
    /// The changed file
    pub resource: PathBuf,
    /// Checksum of the file's content
    pub checksum: String,
}

impl HotRebuildRequest {
    pub fn new(kind: BuildKind, resource: impl Into<PathBuf>, content: &[u8]) -> Self {
        Self {
            kind,
            target_hint: None,
            resource: resource.into(),
            checksum: content_checksum(content),
        }
    }

    #[must_use]
    pub fn with_target_hint(mut self, hint: Option<String>) -> Self {
        self.target_hint = hint;
        self
    }

    fn build_request(&self) -> BuildRequest {
        BuildRequest::new(self.kind).with_target_hint(self.target_hint.clone())
    }
}

/// Why a request did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Same content as the last rebuilt version
    Unchanged,
    /// Hot rebuilding is turned off
    Disabled,
    /// Not a hot kind
    NotHot,
}

/// What happened to a submitted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Ran right away; replays have run too by the time this is returned
    Ran(BuildStatus),
    /// Parked until the running build completes
    Deferred {
        /// Whether a pending request of the same kind was replaced
        replaced: bool,
    },
    Dropped(DropReason),
}

#[derive(Debug, Default)]
struct CoalescerState {
    checksums: HashMap<PathBuf, String>,
    deferred: HashMap<BuildKind, HotRebuildRequest>,
}

impl CoalescerState {
    fn is_unchanged(&self, request: &HotRebuildRequest) -> bool {
        self.checksums.get(&request.resource) == Some(&request.checksum)
    }

    /// Park `request`, merging it with a pending one of the same kind
    ///
    /// The newer request's content wins; differing target hints widen to
    /// every target. Returns whether a pending request was replaced.
    fn defer(&mut self, request: HotRebuildRequest, is_newer: bool) -> bool {
        let kind = request.kind;
        let Some(pending) = self.deferred.remove(&kind) else {
            self.deferred.insert(kind, request);
            return false;
        };
        let (older, mut newer) = if is_newer {
            (pending, request)
        } else {
            (request, pending)
        };
        if older.target_hint != newer.target_hint {
            newer.target_hint = None;
        }
        self.deferred.insert(kind, newer);
        true
    }

    /// Next request to replay: the finished kind first, then fixed order
    fn pop_next(&mut self, finished: Option<BuildKind>) -> Option<HotRebuildRequest> {
        if let Some(kind) = finished {
            if let Some(request) = self.deferred.remove(&kind) {
                return Some(request);
            }
        }
        BuildKind::HOT
            .iter()
            .find_map(|kind| self.deferred.remove(kind))
    }
}

/// Debounces and serializes hot rebuilds on the debug lane
pub struct Coalescer<B: HotRebuild> {
    builder: Arc<B>,
    enabled: bool,
    state: Mutex<CoalescerState>,
}

impl<B: HotRebuild> std::fmt::Debug for Coalescer<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Coalescer")
            .field("enabled", &self.enabled)
            .field("deferred", &state.deferred.len())
            .finish()
    }
}

impl<B: HotRebuild> Coalescer<B> {
    pub fn new(builder: Arc<B>) -> Self {
        Self {
            builder,
            enabled: true,
            state: Mutex::new(CoalescerState::default()),
        }
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Kinds currently parked
    pub fn deferred_kinds(&self) -> Vec<BuildKind> {
        let state = self.state.lock();
        BuildKind::HOT
            .into_iter()
            .filter(|kind| state.deferred.contains_key(kind))
            .collect()
    }

    /// The parked request of `kind`
    pub fn deferred(&self, kind: BuildKind) -> Option<HotRebuildRequest> {
        self.state.lock().deferred.get(&kind).cloned()
    }

    /// Run, defer or drop a request
    pub async fn submit(&self, request: HotRebuildRequest) -> Submission {
        if !self.enabled {
            return Submission::Dropped(DropReason::Disabled);
        }
        if !request.kind.is_hot() {
            return Submission::Dropped(DropReason::NotHot);
        }

        let ticket = {
            let mut state = self.state.lock();
            if state.is_unchanged(&request) {
                tracing::debug!("{} unchanged, skipping", request.resource.display());
                return Submission::Dropped(DropReason::Unchanged);
            }
            let Some(ticket) = self.builder.try_begin(request.kind) else {
                let kind = request.kind;
                let replaced = state.defer(request, true);
                tracing::debug!("Debug lane busy, deferring {kind} (replaced: {replaced})");
                return Submission::Deferred { replaced };
            };
            state
                .checksums
                .insert(request.resource.clone(), request.checksum.clone());
            ticket
        };

        let kind = request.kind;
        let status = self.builder.rebuild(ticket, request.build_request()).await;
        self.replay(Some(kind), status.clone()).await;
        Submission::Ran(status)
    }

    /// Run a full build, then replay what was deferred meanwhile
    pub async fn build(&self, request: BuildRequest) -> BuildStatus {
        let status = self.builder.build(request).await;
        if !matches!(status, BuildStatus::Rejected) {
            self.replay(None, status.clone()).await;
        }
        status
    }

    /// Abort the debug lane and forget every deferred request
    pub fn abort(&self) -> bool {
        let cleared = {
            let mut state = self.state.lock();
            let cleared = state.deferred.len();
            state.deferred.clear();
            cleared
        };
        if cleared > 0 {
            tracing::info!("Cleared {cleared} deferred hot rebuild(s)");
        }
        self.builder.abort(Lane::Debug)
    }

    /// Replay one deferred request per completion until none is left
    async fn replay(&self, mut finished: Option<BuildKind>, mut status: BuildStatus) {
        loop {
            let (ticket, request): (BuildTicket, HotRebuildRequest) = {
                let mut state = self.state.lock();
                if status.is_aborted() {
                    state.deferred.clear();
                    return;
                }
                let Some(request) = state.pop_next(finished) else {
                    return;
                };
                if state.is_unchanged(&request) {
                    tracing::debug!("Deferred {} is unchanged, dropping", request.kind);
                    continue;
                }
                let Some(ticket) = self.builder.try_begin(request.kind) else {
                    state.defer(request, false);
                    return;
                };
                state
                    .checksums
                    .insert(request.resource.clone(), request.checksum.clone());
                (ticket, request)
            };

            tracing::info!("Replaying deferred {}", request.kind);
            finished = Some(request.kind);
            status = self.builder.rebuild(ticket, request.build_request()).await;
        }
    }
}

/// Map a changed path to the hot rebuild it triggers
///
/// Returns the kind and, for Swift sources, the target directory the file
/// lives in.
pub fn classify(root: &Path, web_sources: &str, path: &Path) -> Option<(BuildKind, Option<String>)> {
    let relative = path.strip_prefix(root).ok()?;

    if relative == Path::new(PACKAGE_MANIFEST) {
        return Some((BuildKind::HotSwift, None));
    }

    if let Ok(source) = relative.strip_prefix(SOURCES_DIR) {
        if path.extension().and_then(|e| e.to_str()) != Some("swift") {
            return None;
        }
        let mut components = source.components();
        let target = components.next()?.as_os_str().to_str()?.to_string();
        components.next()?;
        return Some((BuildKind::HotSwift, Some(target)));
    }

    let web = relative.strip_prefix(web_sources).ok()?;
    if web == Path::new("tsconfig.json") {
        return Some((BuildKind::HotScript, None));
    }
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "css" | "scss" | "sass" => Some((BuildKind::HotStyle, None)),
        "js" | "ts" | "tsx" => Some((BuildKind::HotScript, None)),
        "html" => Some((BuildKind::HotMarkup, None)),
        _ => None,
    }
}
