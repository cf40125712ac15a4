use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ShellConfig;
use crate::executor::ToolError;
use crate::policy::SandboxPolicy;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

const OUTPUT_CHANNEL_CAPACITY: usize = 64;

/// How long to keep reading after the shell exits.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// Exit codes that accompany permission errors from the shell or the
/// command itself.
const PERMISSION_EXIT_CODES: &[i32] = &[126, 13, 1];

/// One command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    pub command: String,
    pub argv: Vec<String>,
    pub working_directory: Option<PathBuf>,
    /// Overrides the executor's default timeout.
    pub timeout: Option<Duration>,
}

impl ExecRequest {
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        let command = command.into();
        let argv = super::parse::tokenize(&command);
        Self {
            command,
            argv,
            working_directory: None,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// What the sandbox layer observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessStatus {
    Exited {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    /// The sandbox refused or blocked the command.
    Rejected { message: String },
    /// Killed after the cancellation token fired; streams hold what was read.
    Terminated { stdout: String, stderr: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxOutput {
    pub working_directory: Option<String>,
    pub status: ProcessStatus,
}

/// Creates and supervises processes on behalf of the executor.
///
/// Implementations must return promptly with [`ProcessStatus::Terminated`]
/// once `cancel` fires.
pub trait SandboxRunner: Send + Sync {
    fn run<'a>(
        &'a self,
        request: &'a ExecRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<SandboxOutput, ToolError>>;
}

/// Runs commands through a local shell after checking them against a
/// [`SandboxPolicy`].
#[derive(Debug)]
pub struct ProcessSandbox {
    shell: String,
    login: bool,
    policy: SandboxPolicy,
}

impl ProcessSandbox {
    #[must_use]
    pub fn new(config: &ShellConfig) -> Self {
        Self {
            shell: config.shell.clone(),
            login: config.login,
            policy: SandboxPolicy::new(config),
        }
    }

    async fn run_process(
        &self,
        request: &ExecRequest,
        cancel: CancellationToken,
    ) -> Result<SandboxOutput, ToolError> {
        let working_directory = match &request.working_directory {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        let display = working_directory.display().to_string();
        let output = |status| SandboxOutput {
            working_directory: Some(display.clone()),
            status,
        };

        if let Some(message) = self.policy.denial(&request.command) {
            tracing::debug!(command = %request.command, "sandbox rejected command: {message}");
            return Ok(output(ProcessStatus::Rejected { message }));
        }

        if !working_directory.is_dir() {
            return Ok(output(ProcessStatus::Exited {
                exit_code: -1,
                stdout: String::new(),
                stderr: format!("Working directory does not exist: {display}"),
            }));
        }

        let mut command = Command::new(&self.shell);
        command
            .arg(if self.login { "-lc" } else { "-c" })
            .arg(&request.command)
            .current_dir(&working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so cancellation reaches background jobs too.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Ok(output(ProcessStatus::Rejected {
                    message: e.to_string(),
                }));
            }
            Err(e) => {
                return Err(ToolError::infrastructure(format!(
                    "failed to spawn {}: {e}",
                    self.shell
                )));
            }
        };
        let pid = child.id();

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ToolError::infrastructure("stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ToolError::infrastructure("stderr was not captured"))?;

        let (chunk_tx, mut chunk_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let readers = [
            spawn_reader(stdout, Stream::Stdout, chunk_tx.clone()),
            spawn_reader(stderr, Stream::Stderr, chunk_tx),
        ];

        let mut captured = Captured::default();
        let mut streams_open = true;
        let status = loop {
            tokio::select! {
                chunk = chunk_rx.recv(), if streams_open => match chunk {
                    Some(chunk) => captured.push(chunk),
                    None => streams_open = false,
                },
                status = child.wait() => {
                    break status.map_err(|e| {
                        ToolError::infrastructure(format!("failed to wait for command: {e}"))
                    })?;
                }
                () = cancel.cancelled() => {
                    kill_process_group(pid);
                    if let Err(e) = child.kill().await {
                        tracing::warn!(command = %request.command, "failed to kill cancelled command: {e}");
                    }
                    for reader in &readers {
                        reader.abort();
                    }
                    while let Ok(chunk) = chunk_rx.try_recv() {
                        captured.push(chunk);
                    }
                    let (stdout, stderr) = captured.finish();
                    return Ok(output(ProcessStatus::Terminated { stdout, stderr }));
                }
            }
        };

        // The shell has exited. Background jobs may still hold the pipes open,
        // so only wait a short while for output that is already buffered.
        let deadline = tokio::time::Instant::now() + OUTPUT_DRAIN_TIMEOUT;
        while streams_open {
            match tokio::time::timeout_at(deadline, chunk_rx.recv()).await {
                Ok(Some(chunk)) => captured.push(chunk),
                Ok(None) => streams_open = false,
                Err(_) => {
                    tracing::debug!(command = %request.command, "output still open after exit, detaching");
                    break;
                }
            }
        }
        for reader in &readers {
            reader.abort();
        }

        let exit_code = status.code().unwrap_or(-1);
        let (stdout, stderr) = captured.finish();

        if let Some(message) = permission_failure(exit_code, &stderr) {
            tracing::debug!(command = %request.command, exit_code, "command hit a sandbox permission error");
            return Ok(output(ProcessStatus::Rejected { message }));
        }

        Ok(output(ProcessStatus::Exited {
            exit_code,
            stdout,
            stderr,
        }))
    }
}

impl SandboxRunner for ProcessSandbox {
    fn run<'a>(
        &'a self,
        request: &'a ExecRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<SandboxOutput, ToolError>> {
        Box::pin(self.run_process(request, cancel))
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

#[derive(Default)]
struct Captured {
    stdout: String,
    stderr: String,
}

impl Captured {
    fn push(&mut self, (stream, chunk): (Stream, String)) {
        match stream {
            Stream::Stdout => self.stdout.push_str(&chunk),
            Stream::Stderr => self.stderr.push_str(&chunk),
        }
    }

    fn finish(self) -> (String, String) {
        (
            self.stdout.trim_end().to_owned(),
            self.stderr.trim_end().to_owned(),
        )
    }
}

fn spawn_reader<R>(
    reader: R,
    stream: Stream,
    tx: mpsc::Sender<(Stream, String)>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let chunk = String::from_utf8_lossy(&buf).into_owned();
                    if tx.send((stream, chunk)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("failed to read command output: {e}");
                    break;
                }
            }
        }
    })
}

/// SIGKILL every process in the group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pgid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    // SAFETY: kill(2) takes plain integers and touches no memory.
    if unsafe { libc::kill(-pgid, libc::SIGKILL) } == -1 {
        tracing::debug!(pgid, "process group already gone: {}", std::io::Error::last_os_error());
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Message for a command the OS refused to let touch something, if `stderr`
/// and `exit_code` look like one.
fn permission_failure(exit_code: i32, stderr: &str) -> Option<String> {
    let lower = stderr.to_lowercase();
    let denied = lower.contains("permission denied") || lower.contains("operation not permitted");
    (denied && PERMISSION_EXIT_CODES.contains(&exit_code)).then(|| stderr.trim().to_owned())
}
