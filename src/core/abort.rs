//! Abort handle
//!
//! One [`AbortHandle`] is created per build invocation. Aborting it
//! cancels the handle's token and the attached [`TaskRunner`], if any, and
//! runs the registered callback exactly once.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::core::task_runner::TaskRunner;

type CancelCallback = Box<dyn FnOnce() + Send>;

struct AbortInner {
    token: CancellationToken,
    on_cancel: Mutex<Option<CancelCallback>>,
    runner: Mutex<Option<TaskRunner>>,
}

/// Cancellation handle for one in-flight build
#[derive(Clone)]
pub struct AbortHandle {
    inner: Arc<AbortInner>,
}

impl std::fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbortHandle")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl AbortHandle {
    /// Create a handle with a cancellation callback
    pub fn new<F>(on_cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            inner: Arc::new(AbortInner {
                token: CancellationToken::new(),
                on_cancel: Mutex::new(Some(Box::new(on_cancel))),
                runner: Mutex::new(None),
            }),
        }
    }

    /// Abort the build
    ///
    /// Idempotent: only the first call has any effect.
    pub fn abort(&self) {
        let Some(callback) = self.inner.on_cancel.lock().take() else {
            return;
        };
        tracing::info!("Build aborted");
        self.inner.token.cancel();
        // Before the callback releases the lane
        if let Some(runner) = self.inner.runner.lock().as_ref() {
            runner.cancel();
        }
        callback();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Drop the callback without running it
    ///
    /// Called when the build completes; later aborts become no-ops.
    /// Returns `false` if the handle was already aborted.
    pub fn disarm(&self) -> bool {
        self.inner.on_cancel.lock().take().is_some()
    }

    /// Attach the runner cancelled by [`abort`](Self::abort)
    ///
    /// Attaching to an already aborted handle cancels the runner at once.
    pub fn attach_runner(&self, runner: TaskRunner) {
        let mut slot = self.inner.runner.lock();
        if self.is_cancelled() {
            runner.cancel();
        }
        *slot = Some(runner);
    }

    /// Token cancelled together with this handle
    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::process::ProcessExecutor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handle() -> (AbortHandle, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handle = AbortHandle::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (handle, calls)
    }

    #[test]
    fn test_abort_is_idempotent() {
        let (handle, calls) = counting_handle();
        assert!(!handle.is_cancelled());

        handle.abort();
        handle.abort();
        handle.clone().abort();

        assert!(handle.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_token_follows_handle() {
        let (handle, _) = counting_handle();
        let token = handle.token();
        assert!(!token.is_cancelled());
        handle.abort();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_disarm_wins_over_later_abort() {
        let (handle, calls) = counting_handle();
        assert!(handle.disarm());
        handle.abort();
        assert!(!handle.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!handle.disarm());
    }

    #[test]
    fn test_disarm_after_abort_reports_abort() {
        let (handle, _) = counting_handle();
        handle.abort();
        assert!(!handle.disarm());
    }

    #[tokio::test]
    async fn test_abort_cancels_attached_runner() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = TaskRunner::new(Arc::new(ProcessExecutor::new()), dir.path());
        let (handle, _) = counting_handle();

        handle.attach_runner(runner.clone());
        handle.abort();

        assert!(runner.was_cancelled());
    }

    #[tokio::test]
    async fn test_attach_after_abort_cancels_runner() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = TaskRunner::new(Arc::new(ProcessExecutor::new()), dir.path());
        let (handle, calls) = counting_handle();

        handle.abort();
        handle.attach_runner(runner.clone());

        assert!(runner.was_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
