//! Build lanes
//!
//! A [`BuildState`] guards one lane. At most one build runs on a lane at a
//! time, and the lane's abort handle exists exactly while it runs. The
//! lane is acquired through [`BuildState::try_begin`], which returns a
//! [`BuildTicket`]; only that ticket (or its abort callback) releases the
//! lane again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::core::abort::AbortHandle;
use crate::core::kind::{BuildKind, Lane};
use crate::core::report::StatusSink;

#[derive(Debug)]
struct Running {
    kind: BuildKind,
    handle: AbortHandle,
    generation: u64,
}

#[derive(Debug, Default)]
struct LaneState {
    running: Option<Running>,
    generation: u64,
}

/// Running state of one lane
pub struct BuildState {
    lane: Lane,
    state: Mutex<LaneState>,
    refresh: Option<Arc<dyn StatusSink>>,
}

impl std::fmt::Debug for BuildState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildState")
            .field("lane", &self.lane)
            .field("running", &self.running_kind())
            .finish()
    }
}

impl BuildState {
    pub fn new(lane: Lane) -> Arc<Self> {
        Arc::new(Self {
            lane,
            state: Mutex::new(LaneState::default()),
            refresh: None,
        })
    }

    /// A lane that calls the sink's refresh hook whenever it flips
    pub fn with_refresh(lane: Lane, sink: Arc<dyn StatusSink>) -> Arc<Self> {
        Arc::new(Self {
            lane,
            state: Mutex::new(LaneState::default()),
            refresh: Some(sink),
        })
    }

    pub fn lane(&self) -> Lane {
        self.lane
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running.is_some()
    }

    pub fn running_kind(&self) -> Option<BuildKind> {
        self.state.lock().running.as_ref().map(|r| r.kind)
    }

    /// Abort handle of the running build
    pub fn current_abort(&self) -> Option<AbortHandle> {
        self.state.lock().running.as_ref().map(|r| r.handle.clone())
    }

    /// Acquire the lane for `kind`
    ///
    /// Returns `None` when a build is already running. `on_abort` receives
    /// the elapsed time when the build is aborted; the lane is released
    /// right after it returns.
    pub fn try_begin<F>(self: &Arc<Self>, kind: BuildKind, on_abort: F) -> Option<BuildTicket>
    where
        F: FnOnce(Duration) + Send + 'static,
    {
        let started = Instant::now();
        let ticket = {
            let mut state = self.state.lock();
            if let Some(running) = &state.running {
                tracing::debug!(
                    "{} lane busy with {}, refusing {kind}",
                    self.lane,
                    running.kind
                );
                return None;
            }
            state.generation += 1;
            let generation = state.generation;

            let lane = Arc::downgrade(self);
            let handle = AbortHandle::new(move || {
                on_abort(started.elapsed());
                if let Some(lane) = lane.upgrade() {
                    lane.release(generation);
                }
            });
            state.running = Some(Running {
                kind,
                handle: handle.clone(),
                generation,
            });
            BuildTicket {
                state: Arc::clone(self),
                kind,
                handle,
                generation,
                started,
            }
        };
        tracing::debug!("{} lane running {kind}", self.lane);
        self.notify();
        Some(ticket)
    }

    /// Abort the running build, if any
    ///
    /// Returns whether a build was running.
    pub fn abort_current(&self) -> bool {
        let handle = self.current_abort();
        match handle {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    fn release(&self, generation: u64) {
        let released = {
            let mut state = self.state.lock();
            match &state.running {
                Some(running) if running.generation == generation => {
                    state.running = None;
                    true
                }
                _ => false,
            }
        };
        if released {
            tracing::debug!("{} lane idle", self.lane);
            self.notify();
        }
    }

    fn notify(&self) {
        if let Some(sink) = &self.refresh {
            sink.refresh();
        }
    }
}

/// Ownership of a lane for one build
///
/// Dropping the ticket releases the lane unless an abort already did.
#[derive(Debug)]
pub struct BuildTicket {
    state: Arc<BuildState>,
    kind: BuildKind,
    handle: AbortHandle,
    generation: u64,
    started: Instant,
}

impl BuildTicket {
    pub fn kind(&self) -> BuildKind {
        self.kind
    }

    pub fn abort_handle(&self) -> &AbortHandle {
        &self.handle
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Complete the build and release the lane
    ///
    /// Returns `false` when the build was aborted before it completed.
    pub fn finish(self) -> bool {
        self.handle.disarm()
    }
}

impl Drop for BuildTicket {
    fn drop(&mut self) {
        self.handle.disarm();
        self.state.release(self.generation);
    }
}
