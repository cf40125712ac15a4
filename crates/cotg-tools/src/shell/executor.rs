use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::result::{Cancellation, ShellCommandResult};
use super::sandbox::{ExecRequest, ProcessStatus, SandboxOutput, SandboxRunner};
use crate::config::ShellConfig;
use crate::executor::ToolError;
use crate::facade::ToolFacade;

/// How long a cancelled or timed-out command may take to report back after
/// its process was told to stop.
pub const KILL_GRACE: Duration = Duration::from_secs(2);

/// Runs commands through a [`SandboxRunner`] with timeout and cancellation.
#[derive(Clone)]
pub struct ShellExecutor {
    runner: Arc<dyn SandboxRunner>,
    default_timeout: Duration,
}

impl std::fmt::Debug for ShellExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellExecutor")
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

impl ShellExecutor {
    /// Executor using the shell runner provided by `facade`.
    #[must_use]
    pub fn new(facade: &dyn ToolFacade, config: &ShellConfig) -> Self {
        Self::from_runner(facade.shell(), Duration::from_secs(config.timeout))
    }

    #[must_use]
    pub fn from_runner(runner: Arc<dyn SandboxRunner>, default_timeout: Duration) -> Self {
        Self {
            runner,
            default_timeout,
        }
    }

    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Run `request` to completion, rejection, cancellation or timeout.
    ///
    /// Non-zero exits, sandbox rejections and cancellations are all results.
    ///
    /// # Errors
    ///
    /// Returns `ToolError` only when the sandbox layer itself fails.
    pub async fn execute(
        &self,
        request: &ExecRequest,
        cancel: &CancellationToken,
    ) -> Result<ShellCommandResult, ToolError> {
        let start = Instant::now();
        let result = if cancel.is_cancelled() {
            ShellCommandResult::cancelled(Cancellation::Requested, "", "")
                .with_working_directory(requested_directory(request))
        } else {
            self.run_bounded(request, cancel).await?
        };
        let duration_millis = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(
            command = %request.command,
            exit_code = result.exit_code,
            duration_millis,
            "shell command finished"
        );
        Ok(result.with_duration_millis(duration_millis))
    }

    async fn run_bounded(
        &self,
        request: &ExecRequest,
        cancel: &CancellationToken,
    ) -> Result<ShellCommandResult, ToolError> {
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let runner_token = cancel.child_token();
        let mut run = self.runner.run(request, runner_token.clone());

        let stop = tokio::select! {
            output = &mut run => return output.map(completed),
            () = cancel.cancelled() => Cancellation::Requested,
            () = tokio::time::sleep(timeout) => Cancellation::TimedOut {
                timeout_millis: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
        };

        runner_token.cancel();
        tracing::debug!(command = %request.command, "{stop}, waiting for the process to stop");

        match tokio::time::timeout(KILL_GRACE, run).await {
            Ok(output) => output.map(|output| stopped(output, stop)),
            Err(_) => {
                tracing::warn!(
                    command = %request.command,
                    "sandbox did not report back within {KILL_GRACE:?} of {stop}"
                );
                Ok(ShellCommandResult::cancelled(stop, "", "")
                    .with_working_directory(requested_directory(request)))
            }
        }
    }
}

fn completed(output: SandboxOutput) -> ShellCommandResult {
    let result = match output.status {
        ProcessStatus::Exited {
            exit_code,
            stdout,
            stderr,
        } => ShellCommandResult::exited(exit_code, stdout, stderr),
        ProcessStatus::Rejected { message } => ShellCommandResult::rejected(message),
        ProcessStatus::Terminated { stdout, stderr } => {
            ShellCommandResult::cancelled(Cancellation::Requested, stdout, stderr)
        }
    };
    result.with_working_directory(output.working_directory)
}

fn stopped(output: SandboxOutput, stop: Cancellation) -> ShellCommandResult {
    let (stdout, stderr) = match output.status {
        ProcessStatus::Exited { stdout, stderr, .. }
        | ProcessStatus::Terminated { stdout, stderr } => (stdout, stderr),
        ProcessStatus::Rejected { .. } => (String::new(), String::new()),
    };
    ShellCommandResult::cancelled(stop, stdout, stderr)
        .with_working_directory(output.working_directory)
}

fn requested_directory(request: &ExecRequest) -> Option<String> {
    request
        .working_directory
        .as_ref()
        .map(|dir| dir.display().to_string())
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;

    use super::*;
    use crate::shell::result::ExecOutcome;

    /// Runner that answers with a fixed status after an optional delay, and
    /// can be told to ignore cancellation.
    struct Scripted {
        status: ProcessStatus,
        delay: Duration,
        honor_cancel: bool,
    }

    impl Scripted {
        fn exits(exit_code: i32, stdout: &str) -> Self {
            Self {
                status: ProcessStatus::Exited {
                    exit_code,
                    stdout: stdout.to_owned(),
                    stderr: String::new(),
                },
                delay: Duration::ZERO,
                honor_cancel: true,
            }
        }

        fn hangs(honor_cancel: bool) -> Self {
            Self {
                delay: Duration::from_secs(3600),
                honor_cancel,
                ..Self::exits(0, "")
            }
        }
    }

    impl SandboxRunner for Scripted {
        fn run<'a>(
            &'a self,
            _request: &'a ExecRequest,
            cancel: CancellationToken,
        ) -> Pin<Box<dyn Future<Output = Result<SandboxOutput, ToolError>> + Send + 'a>> {
            Box::pin(async move {
                let status = if self.honor_cancel {
                    tokio::select! {
                        () = tokio::time::sleep(self.delay) => self.status.clone(),
                        () = cancel.cancelled() => ProcessStatus::Terminated {
                            stdout: "partial".to_owned(),
                            stderr: String::new(),
                        },
                    }
                } else {
                    tokio::time::sleep(self.delay).await;
                    self.status.clone()
                };
                Ok(SandboxOutput {
                    working_directory: Some("/work".to_owned()),
                    status,
                })
            })
        }
    }

    struct Broken;

    impl SandboxRunner for Broken {
        fn run<'a>(
            &'a self,
            _request: &'a ExecRequest,
            _cancel: CancellationToken,
        ) -> Pin<Box<dyn Future<Output = Result<SandboxOutput, ToolError>> + Send + 'a>> {
            Box::pin(async { Err(ToolError::infrastructure("no shell")) })
        }
    }

    fn executor(runner: impl SandboxRunner + 'static) -> ShellExecutor {
        ShellExecutor::from_runner(Arc::new(runner), Duration::from_secs(30))
    }

    #[tokio::test]
    async fn normal_completion() {
        let result = executor(Scripted::exits(0, "done"))
            .execute(&ExecRequest::new("make"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.stdout, "done");
        assert_eq!(result.working_directory.as_deref(), Some("/work"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_result() {
        let result = executor(Scripted::exits(1, ""))
            .execute(&ExecRequest::new("false"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.outcome(), ExecOutcome::Completed { exit_code: 1 });
    }

    #[tokio::test]
    async fn rejection_is_result() {
        let runner = Scripted {
            status: ProcessStatus::Rejected {
                message: "blocked command: sudo".to_owned(),
            },
            ..Scripted::exits(0, "")
        };
        let result = executor(runner)
            .execute(&ExecRequest::new("sudo ls"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.outcome(), ExecOutcome::SandboxRejected);
        assert_eq!(result.exit_code, -1);
    }

    #[tokio::test]
    async fn infrastructure_fault_propagates() {
        let err = executor(Broken)
            .execute(&ExecRequest::new("ls"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Infrastructure { .. }));
    }

    #[tokio::test]
    async fn already_cancelled_skips_runner() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = executor(Broken)
            .execute(&ExecRequest::new("ls"), &cancel)
            .await
            .unwrap();
        assert_eq!(
            result.outcome(),
            ExecOutcome::Cancelled(Cancellation::Requested)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_keeps_partial_output() {
        let request = ExecRequest::new("sleep 100").with_timeout(Duration::from_millis(50));
        let result = executor(Scripted::hangs(true))
            .execute(&request, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            result.cancellation,
            Some(Cancellation::TimedOut { timeout_millis: 50 })
        );
        assert_eq!(result.stdout, "partial");
        assert!(!result.is_sandbox_failure());
        assert!(!result.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_request() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let result = executor(Scripted::hangs(true))
            .execute(&ExecRequest::new("sleep 100"), &cancel)
            .await
            .unwrap();
        assert_eq!(result.cancellation, Some(Cancellation::Requested));
        assert_eq!(result.exit_code, -1);
    }

    #[tokio::test(start_paused = true)]
    async fn unresponsive_runner_synthesizes_result() {
        let request = ExecRequest::new("sleep 100")
            .with_working_directory("/project")
            .with_timeout(Duration::from_millis(20));
        let result = executor(Scripted::hangs(false))
            .execute(&request, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            result.cancellation,
            Some(Cancellation::TimedOut { timeout_millis: 20 })
        );
        assert!(result.stdout.is_empty());
        assert_eq!(result.working_directory.as_deref(), Some("/project"));
        assert!(result.duration_millis >= 20);
    }
}
