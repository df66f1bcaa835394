//! Process execution module.
//!
//! Spawns a program with an explicit environment, feeds it stdin, drains
//! its output and bounds the whole exchange with a deadline.

use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command as ProcessCommand;

/// Errors from running a process.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The process could not be started.
    #[error("Failed to spawn process: {0}")]
    Spawn(#[source] std::io::Error),

    /// Reading output or waiting on the process failed.
    #[error("Process IO failed: {0}")]
    Io(#[from] std::io::Error),

    /// The process outlived its deadline and was killed.
    #[error("Process timed out after {0:?}")]
    Timeout(Duration),
}

/// Result of executing a process.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Exit status of the process
    pub status: ExitStatus,

    /// Everything the process wrote to stdout
    pub stdout: Vec<u8>,

    /// Everything the process wrote to stderr (empty unless captured)
    pub stderr: Vec<u8>,

    /// Time taken to execute
    pub duration: Duration,
}

impl ExecutionResult {
    /// Check if the process succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Get the exit code.
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    /// Stderr as lossy UTF-8.
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Process executor.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    /// Whether to capture stderr (vs discard it)
    pub capture_stderr: bool,

    /// Timeout for process execution
    pub timeout: Option<Duration>,
}

impl Executor {
    /// Create a new executor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether to capture stderr.
    #[must_use]
    pub fn capture_stderr(mut self, capture: bool) -> Self {
        self.capture_stderr = capture;
        self
    }

    /// Set execution timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run `program` with `args` and exactly the environment in `env`.
    ///
    /// The host environment is not inherited. When `stdin` is `None` the
    /// child reads from the null device. Stdin is written while stdout and
    /// stderr are drained, so a chatty child cannot deadlock the exchange.
    pub async fn run<S: AsRef<OsStr>>(
        &self,
        program: &Path,
        args: &[S],
        env: &[(String, String)],
        stdin: Option<&[u8]>,
    ) -> Result<ExecutionResult, ExecError> {
        let start = Instant::now();

        let mut cmd = ProcessCommand::new(program);
        cmd.args(args);
        cmd.env_clear();
        for (key, value) in env {
            cmd.env(key, value);
        }

        cmd.stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() });
        cmd.stdout(Stdio::piped());
        cmd.stderr(if self.capture_stderr { Stdio::piped() } else { Stdio::null() });
        cmd.kill_on_drop(true);
        // Own process group, so a timeout also reaches grandchildren.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(ExecError::Spawn)?;
        tracing::trace!(program = %program.display(), pid = ?child.id(), "Spawned process");

        let child_stdin = child.stdin.take();
        let child_stdout = child.stdout.take();
        let child_stderr = child.stderr.take();

        let write_input = async move {
            if let (Some(mut pipe), Some(payload)) = (child_stdin, stdin) {
                match pipe.write_all(payload).await {
                    // The child may exit without reading its input.
                    Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
                    Err(e) => return Err(e),
                    Ok(()) => {}
                }
            }
            Ok(())
        };

        let exchange = async {
            let (_, stdout, stderr) =
                tokio::try_join!(write_input, drain(child_stdout), drain(child_stderr))?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, stdout, stderr))
        };

        let outcome = if let Some(limit) = self.timeout {
            let timed = tokio::time::timeout(limit, exchange).await;
            match timed {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(
                        program = %program.display(),
                        timeout = ?limit,
                        "Process timed out, killing"
                    );
                    #[cfg(unix)]
                    kill_process_group(&child);
                    if let Err(e) = child.kill().await {
                        tracing::debug!(error = %e, "Failed to kill timed out process");
                    }
                    return Err(ExecError::Timeout(limit));
                }
            }
        } else {
            exchange.await
        };

        let (status, stdout, stderr) = outcome?;
        Ok(ExecutionResult { status, stdout, stderr, duration: start.elapsed() })
    }
}

/// Send SIGKILL to the process group led by `child`.
#[cfg(unix)]
#[allow(unsafe_code)]
fn kill_process_group(child: &tokio::process::Child) {
    let Some(pgid) = child.id().and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    // SAFETY: kill(2) takes no pointers; a negative pid addresses the group.
    if unsafe { libc::kill(-pgid, libc::SIGKILL) } != 0 {
        let e = std::io::Error::last_os_error();
        tracing::debug!(pgid, error = %e, "Failed to kill process group");
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}
