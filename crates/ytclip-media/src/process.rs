//! External tool invocation.
//!
//! Every run resolves to a [`ToolOutput`]; spawn failures, signals and
//! timeouts are reported through [`Termination`] rather than as errors, so
//! callers decide what counts as failure.

use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// How long to wait for output pipes to drain after killing a timed-out child.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// How an external process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Process exited normally with this code
    ExitedWithCode(i32),
    /// Process was terminated by a signal (number unknown on some platforms)
    KilledBySignal(Option<i32>),
    /// Wall-clock limit elapsed and the process was killed
    TimedOut(Duration),
    /// Process could not be spawned
    FailedToStart(String),
}

impl Termination {
    /// Only a zero exit code counts as success.
    pub fn is_success(&self) -> bool {
        matches!(self, Termination::ExitedWithCode(0))
    }

    fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Termination::ExitedWithCode(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            Termination::KilledBySignal(status.signal())
        }

        #[cfg(not(unix))]
        {
            Termination::KilledBySignal(None)
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::ExitedWithCode(code) => write!(f, "code {}", code),
            Termination::KilledBySignal(Some(signal)) => write!(f, "signal {}", signal),
            Termination::KilledBySignal(None) => write!(f, "terminated abnormally"),
            Termination::TimedOut(after) => write!(f, "timed out after {}s", after.as_secs()),
            Termination::FailedToStart(reason) => write!(f, "failed to start: {}", reason),
        }
    }
}

/// A program to run with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Command line for logging.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Captured result of a tool run. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub termination: Termination,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ToolOutput {
    pub fn is_success(&self) -> bool {
        self.termination.is_success()
    }

    /// First `limit` characters of stderr. Falls back to the spawn error when
    /// the process never ran.
    pub fn stderr_excerpt(&self, limit: usize) -> String {
        match (&self.termination, self.stderr.is_empty()) {
            (Termination::FailedToStart(reason), true) => reason.chars().take(limit).collect(),
            _ => self.stderr.chars().take(limit).collect(),
        }
    }
}

/// Runs external executables.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run the invocation to completion. Never fails.
    async fn invoke(&self, invocation: &ToolInvocation) -> ToolOutput;
}

/// [`ToolRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn invoke(&self, invocation: &ToolInvocation) -> ToolOutput {
        let started = Instant::now();
        debug!("Running: {}", invocation.command_line());

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.working_dir {
            command.current_dir(dir);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(program = %invocation.program, error = %e, "Failed to spawn tool");
                return ToolOutput {
                    termination: Termination::FailedToStart(e.to_string()),
                    stdout: String::new(),
                    stderr: String::new(),
                    elapsed: started.elapsed(),
                };
            }
        };

        let stdout_task = tokio::spawn(drain(child.stdout.take()));
        let stderr_task = tokio::spawn(drain(child.stderr.take()));

        let wait = child.wait();
        let waited = match invocation.timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.ok(),
            None => Some(wait.await),
        };

        let termination = match waited {
            Some(Ok(status)) => Termination::from_status(status),
            Some(Err(e)) => {
                warn!(program = %invocation.program, error = %e, "Failed to wait for tool");
                let _ = child.kill().await;
                Termination::KilledBySignal(None)
            }
            None => {
                // invocation.timeout is Some here
                let limit = invocation.timeout.unwrap_or_default();
                warn!(
                    program = %invocation.program,
                    timeout_secs = limit.as_secs(),
                    "Tool timed out, killing process"
                );
                let _ = child.kill().await;
                Termination::TimedOut(limit)
            }
        };

        let (stdout, stderr) = if matches!(termination, Termination::TimedOut(_)) {
            // A grandchild may still hold the pipes open.
            (
                tokio::time::timeout(DRAIN_GRACE, stdout_task).await,
                tokio::time::timeout(DRAIN_GRACE, stderr_task).await,
            )
        } else {
            (Ok(stdout_task.await), Ok(stderr_task.await))
        };

        ToolOutput {
            termination,
            stdout: stdout.ok().and_then(Result::ok).unwrap_or_default(),
            stderr: stderr.ok().and_then(Result::ok).unwrap_or_default(),
            elapsed: started.elapsed(),
        }
    }
}

async fn drain<R>(reader: Option<R>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        if let Err(e) = reader.read_to_end(&mut buf).await {
            debug!("Failed to read tool output: {}", e);
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Resolve a tool on `PATH`.
pub fn check_tool(program: &str) -> MediaResult<PathBuf> {
    which::which(program).map_err(|_| MediaError::ToolNotFound(program.to_string()))
}
