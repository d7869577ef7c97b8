//! Serialized command queue
//!
//! A [`TaskRunner`] runs externally composed build steps one at a time in
//! FIFO order. Each [`enqueue`](TaskRunner::enqueue) hands back a future
//! resolving to `true` only when the command exited with code 0 and the
//! runner was not cancelled before or during its execution.
//!
//! Cancellation is sticky: once [`cancel`](TaskRunner::cancel) has been
//! called, every later command resolves `false` without running until
//! [`reset`](TaskRunner::reset) is called.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::infra::process::{Invocation, ProcessExecutor, ProgramLocator};

/// A named external build step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedCommand {
    /// Human readable label, used in logs and failure messages
    pub label: String,
    /// Program path or bare name
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Extra environment
    pub env: HashMap<String, String>,
}

impl QueuedCommand {
    pub fn new(label: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }
}

struct Pending {
    command: QueuedCommand,
    done: oneshot::Sender<bool>,
}

#[derive(Default)]
struct RunnerState {
    queue: VecDeque<Pending>,
    running: bool,
    was_cancelled: bool,
    current: Option<CancellationToken>,
}

impl RunnerState {
    /// Resolve every queued future `false` without running it
    fn drain_pending(&mut self) {
        for pending in self.queue.drain(..) {
            tracing::debug!("Skipping queued step '{}'", pending.command.label);
            let _ = pending.done.send(false);
        }
    }
}

struct RunnerInner {
    executor: Arc<ProcessExecutor>,
    cwd: PathBuf,
    state: Mutex<RunnerState>,
}

/// Serialized, cancellable runner for build steps
///
/// Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct TaskRunner {
    inner: Arc<RunnerInner>,
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("TaskRunner")
            .field("cwd", &self.inner.cwd)
            .field("queued", &state.queue.len())
            .field("running", &state.running)
            .field("was_cancelled", &state.was_cancelled)
            .finish()
    }
}

impl TaskRunner {
    /// Create a runner executing commands in `cwd`
    pub fn new(executor: Arc<ProcessExecutor>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                executor,
                cwd: cwd.into(),
                state: Mutex::new(RunnerState::default()),
            }),
        }
    }

    /// Append a command and wake the runner
    ///
    /// The command is queued immediately; the returned future only reports
    /// its outcome. Must be called within a Tokio runtime.
    pub fn enqueue(&self, command: QueuedCommand) -> impl Future<Output = bool> + Send + 'static {
        let (done, outcome) = oneshot::channel();
        let start = {
            let mut state = self.inner.state.lock();
            if state.was_cancelled {
                tracing::debug!("Runner cancelled, refusing '{}'", command.label);
                let _ = done.send(false);
                false
            } else {
                state.queue.push_back(Pending { command, done });
                !std::mem::replace(&mut state.running, true)
            }
        };
        if start {
            tokio::spawn(self.clone().drain());
        }
        async move { outcome.await.unwrap_or(false) }
    }

    /// Cancel: clear pending steps and terminate the executing one
    pub fn cancel(&self) {
        let mut state = self.inner.state.lock();
        state.was_cancelled = true;
        state.drain_pending();
        if let Some(current) = state.current.take() {
            tracing::info!("Terminating running build step");
            current.cancel();
        }
    }

    /// Clear the sticky cancellation flag
    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        state.was_cancelled = false;
    }

    pub fn was_cancelled(&self) -> bool {
        self.inner.state.lock().was_cancelled
    }

    /// Whether a command is executing or queued
    pub fn is_busy(&self) -> bool {
        self.inner.state.lock().running
    }

    async fn drain(self) {
        loop {
            let (pending, token) = {
                let mut state = self.inner.state.lock();
                if state.was_cancelled {
                    state.drain_pending();
                    state.running = false;
                    return;
                }
                let Some(pending) = state.queue.pop_front() else {
                    state.running = false;
                    return;
                };
                let token = CancellationToken::new();
                state.current = Some(token.clone());
                (pending, token)
            };

            let exited_cleanly = self.run_one(&pending.command, &token).await;

            let succeeded = {
                let mut state = self.inner.state.lock();
                state.current = None;
                let succeeded = exited_cleanly && !state.was_cancelled;
                if !succeeded {
                    state.drain_pending();
                }
                succeeded
            };
            let _ = pending.done.send(succeeded);
        }
    }

    async fn run_one(&self, command: &QueuedCommand, token: &CancellationToken) -> bool {
        tracing::info!("Running '{}'", command.label);
        let invocation = Invocation::new(ProgramLocator::parse(&command.program))
            .args(&command.args)
            .cwd(&self.inner.cwd)
            .envs(&command.env)
            .describe(command.label.clone());

        match self.inner.executor.execute_cancellable(&invocation, token).await {
            Ok(result) => {
                tracing::debug!("'{}' finished in {}ms", command.label, result.duration_ms);
                true
            }
            Err(e) => {
                tracing::warn!("'{}' failed: {e}", command.label);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn runner(dir: &TempDir) -> TaskRunner {
        TaskRunner::new(Arc::new(ProcessExecutor::new()), dir.path())
    }

    fn sh(label: &str, script: &str) -> QueuedCommand {
        QueuedCommand::new(label, "sh").with_args(["-c", script])
    }

    fn read_log(dir: &TempDir) -> Vec<String> {
        std::fs::read_to_string(dir.path().join("log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_commands_run_in_fifo_order() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir);

        let a = runner.enqueue(sh("A", "sleep 0.2; echo A >> log"));
        let b = runner.enqueue(sh("B", "echo B >> log"));
        let c = runner.enqueue(sh("C", "echo C >> log"));

        assert!(a.await);
        assert!(b.await);
        assert!(c.await);
        assert_eq!(read_log(&dir), vec!["A", "B", "C"]);
        assert!(!runner.is_busy());
    }

    #[tokio::test]
    async fn test_non_zero_exit_resolves_false_and_drains_rest() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir);

        let failing = runner.enqueue(sh("fail", "exit 3"));
        let after = runner.enqueue(sh("after", "echo after >> log"));

        assert!(!failing.await);
        assert!(!after.await);
        assert!(read_log(&dir).is_empty());

        // a plain failure is not sticky
        assert!(runner.enqueue(sh("again", "true")).await);
    }

    #[tokio::test]
    async fn test_cancel_terminates_current_and_clears_queue() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir);

        let long = runner.enqueue(sh("long", "sleep 10"));
        let next = runner.enqueue(sh("next", "echo next >> log"));
        tokio::time::sleep(Duration::from_millis(200)).await;
        runner.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(5), async {
            (long.await, next.await)
        })
        .await
        .expect("cancelled step should finish promptly");

        assert_eq!(outcome, (false, false));
        assert!(read_log(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_is_sticky_until_reset() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir);

        runner.cancel();
        assert!(runner.was_cancelled());
        assert!(!runner.enqueue(sh("refused", "echo refused >> log")).await);
        assert!(read_log(&dir).is_empty());

        runner.reset();
        assert!(!runner.was_cancelled());
        assert!(runner.enqueue(sh("accepted", "echo accepted >> log")).await);
        assert_eq!(read_log(&dir), vec!["accepted"]);
    }

    #[tokio::test]
    async fn test_missing_program_resolves_false() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir);
        let command = QueuedCommand::new("ghost", "definitely-not-a-real-program-xyz");
        assert!(!runner.enqueue(command).await);
    }

    #[tokio::test]
    async fn test_env_is_passed_to_command() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir);
        let env = HashMap::from([("STEP_NAME".to_string(), "bundle".to_string())]);
        let command = sh("env", "echo $STEP_NAME >> log").with_env(env);
        assert!(runner.enqueue(command).await);
        assert_eq!(read_log(&dir), vec!["bundle"]);
    }
}
