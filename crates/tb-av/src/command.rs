//! Builder for executing external tool commands with timeout support.
//!
//! Commands are always built from an explicit argument vector and spawned
//! without a shell, so file names never need quoting.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use tb_core::{Error, Result};

/// How long to keep reading a pipe after the process has exited. A detached
/// grandchild can hold the pipe open forever.
const OUTPUT_GRACE: Duration = Duration::from_secs(2);

/// How long a terminated process gets to exit before it is killed.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

impl ToolOutput {
    /// The informational text of the run: stdout, or stderr when stdout is
    /// empty (ffmpeg and friends log to stderr).
    pub fn text(&self) -> &str {
        if self.stdout.is_empty() {
            &self.stderr
        } else {
            &self.stdout
        }
    }
}

/// A builder for constructing and executing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use tb_av::ToolCommand;
/// use std::path::PathBuf;
/// use std::time::Duration;
///
/// # async fn example() -> tb_core::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffprobe"))
///     .args(["-v", "quiet", "-print_format", "json", "-show_format"])
///     .arg("/path/to/video.mp4")
///     .description("Probe")
///     .timeout(Duration::from_secs(30))
///     .execute()
///     .await?;
/// println!("{}", output.text());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    description: Option<String>,
    timeout: Option<Duration>,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            description: None,
            timeout: None,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Describe what the command does; used in error messages.
    pub fn description(&mut self, d: impl Into<String>) -> &mut Self {
        self.description = Some(d.into());
        self
    }

    /// Set the maximum execution time. Without one the command may run
    /// indefinitely.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = Some(d);
        self
    }

    /// Like [`ToolCommand::timeout`] but accepting an optional budget.
    pub fn maybe_timeout(&mut self, d: Option<Duration>) -> &mut Self {
        self.timeout = d;
        self
    }

    /// The full argument vector, program first.
    pub fn command_line(&self) -> Vec<String> {
        std::iter::once(self.program.to_string_lossy().to_string())
            .chain(self.args.iter().cloned())
            .collect()
    }

    fn describe(&self) -> String {
        self.description.clone().unwrap_or_else(|| {
            self.program
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| self.program.to_string_lossy().to_string())
        })
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// - [`Error::Spawn`] if the process cannot be started.
    /// - [`Error::TimedOut`] if the timeout elapses first. The process is
    ///   terminated and reaped before the error is returned, and the error
    ///   carries whatever output was captured up to that point.
    /// - [`Error::CommandFailed`] if the process exits with a non-zero status.
    pub async fn execute(&self) -> Result<ToolOutput> {
        let command = self.command_line();
        tracing::debug!("exec: {}", tb_core::error::render_command(&command));

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // An aborted job task must not leave its encoder running.
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| Error::Spawn {
            command: command.clone(),
            source,
        })?;

        let stdout_capture = Capture::start(child.stdout.take());
        let stderr_capture = Capture::start(child.stderr.take());

        let status = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_elapsed) => {
                    terminate(&mut child);
                    if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
                        tracing::debug!("process ignored SIGTERM; killing");
                        child.start_kill()?;
                        child.wait().await?;
                    }
                    let stdout = stdout_capture.finish().await;
                    let stderr = stderr_capture.finish().await;
                    tracing::warn!(
                        "{} timed out after {:?}; process terminated",
                        self.describe(),
                        limit
                    );
                    return Err(Error::TimedOut {
                        description: self.describe(),
                        command,
                        timeout: limit,
                        stdout,
                        stderr,
                    });
                }
            },
            None => child.wait().await?,
        };

        let stdout = stdout_capture.finish().await;
        let stderr = stderr_capture.finish().await;

        if !status.success() {
            return Err(Error::CommandFailed {
                description: self.describe(),
                command,
                stdout,
                stderr,
                code: status.code(),
            });
        }

        Ok(ToolOutput {
            status,
            stdout,
            stderr,
        })
    }
}

/// Background capture of one output pipe into a shared buffer, so the
/// bytes read so far survive even if the reader has to be abandoned.
struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
    reader: Option<JoinHandle<()>>,
}

impl Capture {
    fn start<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let reader = pipe.map(|pipe| tokio::spawn(drain(pipe, buf.clone())));
        Self { buf, reader }
    }

    /// Wait (bounded) for EOF, then return the captured text.
    async fn finish(self) -> String {
        if let Some(mut reader) = self.reader {
            if tokio::time::timeout(OUTPUT_GRACE, &mut reader).await.is_err() {
                tracing::debug!("output pipe still open after exit; abandoning capture");
                reader.abort();
            }
        }
        let bytes = std::mem::take(&mut *self.buf.lock());
        String::from_utf8_lossy(&bytes).to_string()
    }
}

/// Read a pipe to EOF. Read errors end the capture early rather than failing
/// the run; the exit status is what decides success.
async fn drain<R: AsyncRead + Unpin>(mut pipe: R, buf: Arc<Mutex<Vec<u8>>>) {
    let mut chunk = [0u8; 8192];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => buf.lock().extend_from_slice(&chunk[..n]),
            Err(e) => {
                tracing::debug!("output capture ended early: {e}");
                break;
            }
        }
    }
}

/// Ask the child to stop: SIGTERM on unix, a hard kill elsewhere.
#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // `None` means the child was already reaped.
    if let Some(pid) = child.id() {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            tracing::debug!("SIGTERM to {pid} failed ({e}); killing");
            let _ = child.start_kill();
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}
