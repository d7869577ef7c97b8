//! External process execution
//!
//! Runs external programs, captures their output line by line and reports
//! the outcome as a [`ProcessResult`]. Programs are located either by an
//! explicit path or through a `which` lookup against `PATH`.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::ExecutionError;

/// How to find the program to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramLocator {
    /// Absolute or relative path, used as-is
    Path(PathBuf),
    /// Bare name resolved against `PATH`
    Name(String),
}

impl ProgramLocator {
    /// Interpret a program string from configuration
    ///
    /// Anything containing a path separator is treated as a path.
    pub fn parse(program: &str) -> Self {
        if program.contains('/') || program.contains(std::path::MAIN_SEPARATOR) {
            Self::Path(PathBuf::from(program))
        } else {
            Self::Name(program.to_string())
        }
    }
}

impl std::fmt::Display for ProgramLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

/// A single program invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Program to run
    pub program: ProgramLocator,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory
    pub cwd: Option<PathBuf>,
    /// Extra environment variables
    pub env: HashMap<String, String>,
    /// Short description used in error messages ("build App")
    pub description: Option<String>,
}

impl Invocation {
    /// Create an invocation from a locator
    pub fn new(program: ProgramLocator) -> Self {
        Self {
            program,
            args: Vec::new(),
            cwd: None,
            env: HashMap::new(),
            description: None,
        }
    }

    /// Create an invocation for a program string
    pub fn program(program: &str) -> Self {
        Self::new(ProgramLocator::parse(program))
    }

    /// Append arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory
    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Add environment variables
    #[must_use]
    pub fn envs(mut self, env: &HashMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Set the description
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Outcome of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResult {
    /// Resolved executable path
    pub executable: PathBuf,
    /// What the process was doing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// Exit code (-1 when killed by a signal)
    pub code: i32,
    /// Trimmed standard output
    pub stdout: String,
    /// Trimmed standard error
    pub stderr: String,
}

impl ProcessResult {
    /// Whether the process exited successfully
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Process executor with a `which` cache
#[derive(Debug, Default)]
pub struct ProcessExecutor {
    which_cache: Mutex<HashMap<String, PathBuf>>,
}

impl ProcessExecutor {
    /// Create a new executor
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a bare program name against `PATH`
    pub fn which(&self, name: &str) -> Option<PathBuf> {
        if let Some(path) = self.which_cache.lock().get(name) {
            return Some(path.clone());
        }
        let path = which::which(name).ok()?;
        self.which_cache
            .lock()
            .insert(name.to_string(), path.clone());
        Some(path)
    }

    /// Resolve a locator to an executable path
    pub fn locate(&self, program: &ProgramLocator) -> Result<PathBuf, ExecutionError> {
        match program {
            ProgramLocator::Path(path) => Ok(path.clone()),
            ProgramLocator::Name(name) => {
                self.which(name).ok_or_else(|| ExecutionError::NotFound {
                    program: name.clone(),
                })
            }
        }
    }

    /// Run a program to completion
    pub async fn execute(&self, invocation: &Invocation) -> Result<ProcessResult, ExecutionError> {
        self.run(invocation, None).await
    }

    /// Run a program, killing it when `cancel` fires
    ///
    /// A killed process yields [`ExecutionError::Terminated`].
    pub async fn execute_cancellable(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<ProcessResult, ExecutionError> {
        self.run(invocation, Some(cancel)).await
    }

    async fn run(
        &self,
        invocation: &Invocation,
        cancel: Option<&CancellationToken>,
    ) -> Result<ProcessResult, ExecutionError> {
        let executable = self.locate(&invocation.program)?;
        let started = Instant::now();

        let mut command = Command::new(&executable);
        command
            .args(&invocation.args)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }

        tracing::debug!(
            "Executing {} {}",
            executable.display(),
            invocation.args.join(" ")
        );

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return Err(ExecutionError::Spawn {
                    program: invocation.program.to_string(),
                    error: e.to_string(),
                    partial: ProcessResult {
                        executable,
                        description: invocation.description.clone(),
                        duration_ms: elapsed_ms(started),
                        code: -1,
                        ..ProcessResult::default()
                    },
                });
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut waited = Box::pin(async {
            let (out, err) = tokio::join!(
                collect_stream(stdout, "stdout"),
                collect_stream(stderr, "stderr")
            );
            let status = child.wait().await;
            (out, err, status)
        });

        let outcome = match cancel {
            None => Some((&mut waited).await),
            Some(token) => tokio::select! {
                outcome = &mut waited => Some(outcome),
                () = token.cancelled() => None,
            },
        };

        let Some((stdout, stderr, status)) = outcome else {
            drop(waited);
            if let Err(e) = child.start_kill() {
                tracing::debug!("Kill of {} failed: {e}", executable.display());
            }
            let _ = child.wait().await;
            tracing::debug!("Terminated {}", executable.display());
            return Err(ExecutionError::Terminated {
                result: ProcessResult {
                    executable,
                    description: invocation.description.clone(),
                    duration_ms: elapsed_ms(started),
                    code: -1,
                    ..ProcessResult::default()
                },
            });
        };

        let mut result = ProcessResult {
            executable,
            description: invocation.description.clone(),
            duration_ms: elapsed_ms(started),
            code: -1,
            stdout: stdout.trim().to_string(),
            stderr: stderr.trim().to_string(),
        };

        match status {
            Ok(status) => {
                result.code = status.code().unwrap_or(-1);
                if result.success() {
                    Ok(result)
                } else {
                    let error = ExecutionError::NonZeroExit { result };
                    tracing::info!("{error}");
                    Err(error)
                }
            }
            Err(e) => Err(ExecutionError::Spawn {
                program: invocation.program.to_string(),
                error: e.to_string(),
                partial: result,
            }),
        }
    }
}

async fn collect_stream<R>(stream: Option<R>, name: &str) -> String
where
    R: AsyncRead + Unpin,
{
    let mut collected = String::new();
    let Some(stream) = stream else {
        return collected;
    };
    let mut reader = BufReader::new(stream);
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buffer);
                let line = line.trim_end_matches(['\n', '\r']);
                tracing::trace!("{name}: {}", line.trim());
                collected.push_str(line);
                collected.push('\n');
            }
            Err(e) => {
                tracing::debug!("Reading {name} failed: {e}");
                break;
            }
        }
    }
    collected
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
