use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::executor::ShellExecutor;
use super::format::{FormattedOutput, format};
use super::parse::{ParsedCommand, classify, tokenize};
use super::payload::ShellCommandPayload;
use super::result::ShellCommandResult;
use super::sandbox::ExecRequest;
use crate::events::{EventEmitter, EventError, ExecCommandBegin, ExecCommandEnd};
use crate::executor::{
    ExplorationKind, ExplorationMetadata, ToolCall, ToolError, ToolOutput, deserialize_params,
};

pub const EMPTY_COMMAND_MESSAGE: &str = "The 'command' parameter cannot be empty.";

/// Arguments of a `shell` tool call.
#[derive(Debug, Clone, Deserialize)]
pub struct ShellCommandArgs {
    pub command: String,
    #[serde(default)]
    pub workdir: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Everything one shell tool call produced.
#[derive(Debug)]
pub struct ShellInvocation {
    pub call_id: String,
    /// `None` when the call was rejected before anything ran.
    pub payload: Option<ShellCommandPayload>,
    pub output: ToolOutput,
    /// Outcome of delivering the end event.
    pub end_delivery: Result<(), EventError>,
}

/// The `shell` tool: classify, announce, execute, format and report one command.
#[derive(Debug, Clone)]
pub struct ShellTool {
    executor: ShellExecutor,
    emitter: EventEmitter,
}

impl ShellTool {
    pub const NAME: &'static str = "shell";

    #[must_use]
    pub fn new(executor: ShellExecutor, emitter: EventEmitter) -> Self {
        Self { executor, emitter }
    }

    /// Dispatch a structured tool call. Returns `Ok(None)` for other tools.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::InvalidParams` for malformed arguments and
    /// `ToolError::Infrastructure` when the sandbox cannot run commands.
    pub async fn execute_tool_call(
        &self,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> Result<Option<ToolOutput>, ToolError> {
        if call.tool_id != Self::NAME {
            return Ok(None);
        }
        let args: ShellCommandArgs = deserialize_params(&call.params)?;
        let call_id = uuid::Uuid::new_v4().to_string();
        let invocation = self.invoke(call_id, args, cancel).await?;
        Ok(Some(invocation.output))
    }

    /// Run one command under `call_id`. Emits exactly one begin and one end
    /// event unless the command is blank.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::Infrastructure` when the sandbox layer fails. The
    /// end event has already been emitted in that case.
    pub async fn invoke(
        &self,
        call_id: impl Into<String>,
        args: ShellCommandArgs,
        cancel: &CancellationToken,
    ) -> Result<ShellInvocation, ToolError> {
        let call_id = call_id.into();
        let command = args.command.trim();
        if command.is_empty() {
            return Ok(ShellInvocation {
                call_id,
                payload: None,
                output: ToolOutput::failure(
                    Self::NAME,
                    EMPTY_COMMAND_MESSAGE,
                    EMPTY_COMMAND_MESSAGE,
                ),
                end_delivery: Ok(()),
            });
        }

        let command = command.to_owned();
        let argv = tokenize(&command);
        let parsed = classify(&command, &argv);
        tracing::debug!(%call_id, %command, "running shell command");

        let begin = ExecCommandBegin {
            call_id: call_id.clone(),
            command: command.clone(),
            argv: argv.clone(),
            parsed_command: parsed.clone(),
        };
        self.emitter.begin(&begin).await;

        let request = ExecRequest {
            command: command.clone(),
            argv: argv.clone(),
            working_directory: args.workdir.map(PathBuf::from),
            timeout: args.timeout_ms.map(Duration::from_millis),
        };

        let started = Instant::now();
        let result = match self.executor.execute(&request, cancel).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(%call_id, "shell command could not be executed: {e}");
                let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                let end = infrastructure_end(begin, &e, elapsed);
                if let Err(delivery) = self.emitter.end(&end).await {
                    tracing::warn!(%call_id, "end event after failure was not delivered: {delivery}");
                }
                return Err(e);
            }
        };

        let formatted = format(&result);
        let end_delivery = self.emitter.end(&end_event(begin, &result, &formatted)).await;

        let exploration = if result.is_success() {
            exploration(&parsed)
        } else {
            None
        };
        let output = tool_output(&result, &formatted.text).with_exploration(exploration);
        let payload = ShellCommandPayload::new(command, argv, parsed, result, formatted);
        let output = match serde_json::to_value(&payload) {
            Ok(data) => output.with_data(data),
            Err(e) => {
                tracing::warn!(%call_id, "failed to serialize shell payload: {e}");
                output
            }
        };

        Ok(ShellInvocation {
            call_id,
            payload: Some(payload),
            output,
            end_delivery,
        })
    }
}

fn end_event(
    begin: ExecCommandBegin,
    result: &ShellCommandResult,
    formatted: &FormattedOutput,
) -> ExecCommandEnd {
    ExecCommandEnd {
        call_id: begin.call_id,
        command: begin.command,
        argv: begin.argv,
        parsed_command: begin.parsed_command,
        exit_code: result.exit_code,
        stdout: result.stdout.clone(),
        stderr: result.stderr.clone(),
        formatted_output: formatted.text.clone(),
        sandbox_failure: result.sandbox_failure.clone(),
        duration_millis: result.duration_millis,
        truncated: formatted.truncated,
        success: result.is_success(),
        cancellation: result.cancellation,
    }
}

fn infrastructure_end(
    begin: ExecCommandBegin,
    error: &ToolError,
    duration_millis: u64,
) -> ExecCommandEnd {
    let message = error.to_string();
    ExecCommandEnd {
        call_id: begin.call_id,
        command: begin.command,
        argv: begin.argv,
        parsed_command: begin.parsed_command,
        exit_code: -1,
        stdout: String::new(),
        stderr: message.clone(),
        formatted_output: message,
        sandbox_failure: None,
        duration_millis,
        truncated: false,
        success: false,
        cancellation: None,
    }
}

fn tool_output(result: &ShellCommandResult, text: &str) -> ToolOutput {
    if result.is_success() {
        return ToolOutput::success(ShellTool::NAME, text);
    }
    let details = [
        Some(result.stderr.as_str()),
        result.sandbox_failure.as_deref(),
    ]
    .into_iter()
    .flatten()
    .find(|s| !s.trim().is_empty())
    .unwrap_or(text);
    ToolOutput::failure(ShellTool::NAME, text, details)
}

fn exploration(parsed: &ParsedCommand) -> Option<ExplorationMetadata> {
    match parsed {
        ParsedCommand::Read { files, .. } => Some(ExplorationMetadata {
            kind: ExplorationKind::Read,
            items: files.clone(),
            query: None,
            path: None,
        }),
        ParsedCommand::ListFiles { path, .. } => Some(ExplorationMetadata {
            kind: ExplorationKind::List,
            items: Vec::new(),
            query: None,
            path: Some(path.clone()),
        }),
        ParsedCommand::Search { query, path, .. } => Some(ExplorationMetadata {
            kind: ExplorationKind::Search,
            items: Vec::new(),
            query: Some(query.clone()),
            path: path.clone(),
        }),
        ParsedCommand::Mutating { .. }
        | ParsedCommand::Network { .. }
        | ParsedCommand::Unknown { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Arc;

    use super::*;
    use crate::config::ShellConfig;
    use crate::events::{ChannelObserver, ExecEvent};
    use crate::shell::result::Cancellation;
    use crate::shell::sandbox::{ProcessSandbox, SandboxOutput, SandboxRunner};

    fn tool() -> (ShellTool, tokio::sync::mpsc::Receiver<ExecEvent>) {
        let config = ShellConfig {
            login: false,
            ..ShellConfig::default()
        };
        let executor =
            ShellExecutor::from_runner(Arc::new(ProcessSandbox::new(&config)), Duration::from_secs(30));
        let (observer, rx) = ChannelObserver::channel(16);
        let emitter = EventEmitter::new().with_observer(Arc::new(observer));
        (ShellTool::new(executor, emitter), rx)
    }

    fn args(command: &str) -> ShellCommandArgs {
        ShellCommandArgs {
            command: command.to_owned(),
            workdir: None,
            timeout_ms: None,
        }
    }

    #[tokio::test]
    async fn blank_command_is_failed_result_without_events() {
        let (tool, mut rx) = tool();
        let invocation = tool
            .invoke("c0", args("   "), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!invocation.output.success);
        assert_eq!(invocation.output.summary, EMPTY_COMMAND_MESSAGE);
        assert!(invocation.payload.is_none());
        drop(tool);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn successful_command_emits_begin_then_end() {
        let (tool, mut rx) = tool();
        let invocation = tool
            .invoke("c1", args("echo hello"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(invocation.output.success);
        assert_eq!(invocation.output.summary, "hello");
        assert!(invocation.end_delivery.is_ok());

        let payload = invocation.payload.unwrap();
        assert_eq!(payload.exit_code, 0);
        assert_eq!(payload.formatted_output, "hello");
        assert_eq!(payload.argv, vec!["echo", "hello"]);

        let Some(ExecEvent::Begin(begin)) = rx.recv().await else {
            panic!("expected begin event");
        };
        assert_eq!(begin.call_id, "c1");
        let Some(ExecEvent::End(end)) = rx.recv().await else {
            panic!("expected end event");
        };
        assert_eq!(end.call_id, "c1");
        assert!(end.success);
    }

    #[tokio::test]
    async fn failing_command_reports_stderr() {
        let (tool, _rx) = tool();
        let invocation = tool
            .invoke("c2", args("echo bad >&2; exit 4"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!invocation.output.success);
        assert_eq!(invocation.output.error_details.as_deref(), Some("bad"));
        assert_eq!(invocation.payload.unwrap().exit_code, 4);
    }

    #[tokio::test]
    async fn sandbox_rejection_reports_message() {
        let (tool, mut rx) = tool();
        let invocation = tool
            .invoke("c3", args("sudo ls"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!invocation.output.success);
        assert_eq!(
            invocation.output.summary,
            "failed in sandbox: blocked command: sudo"
        );
        assert_eq!(
            invocation.output.error_details.as_deref(),
            Some("blocked command: sudo")
        );
        assert!(matches!(rx.recv().await, Some(ExecEvent::Begin(_))));
        let Some(ExecEvent::End(end)) = rx.recv().await else {
            panic!("expected end event");
        };
        assert_eq!(end.sandbox_failure.as_deref(), Some("blocked command: sudo"));
        assert!(!end.success);
    }

    #[tokio::test]
    async fn timeout_still_emits_end() {
        let (tool, mut rx) = tool();
        let mut request = args("sleep 30");
        request.timeout_ms = Some(100);
        let invocation = tool
            .invoke("c4", request, &CancellationToken::new())
            .await
            .unwrap();
        let payload = invocation.payload.unwrap();
        assert_eq!(
            payload.cancellation,
            Some(Cancellation::TimedOut { timeout_millis: 100 })
        );
        assert!(payload.formatted_output.contains("timed out after 100 ms"));

        assert!(matches!(rx.recv().await, Some(ExecEvent::Begin(_))));
        let Some(ExecEvent::End(end)) = rx.recv().await else {
            panic!("expected end event");
        };
        assert!(end.cancellation.is_some());
        assert!(!end.success);
    }

    #[tokio::test]
    async fn exploration_metadata_for_listing() {
        let dir = tempfile::tempdir().unwrap();
        let (tool, _rx) = tool();
        let mut request = args("ls -a");
        request.workdir = Some(dir.path().display().to_string());
        let invocation = tool
            .invoke("c5", request, &CancellationToken::new())
            .await
            .unwrap();
        let exploration = invocation.output.exploration.unwrap();
        assert_eq!(exploration.kind, ExplorationKind::List);
        assert_eq!(exploration.path.as_deref(), Some("."));
    }

    #[tokio::test]
    async fn tool_call_dispatch() {
        let (tool, _rx) = tool();
        let cancel = CancellationToken::new();

        let other = ToolCall {
            tool_id: "read".to_owned(),
            params: HashMap::new(),
        };
        assert!(tool.execute_tool_call(&other, &cancel).await.unwrap().is_none());

        let bad = ToolCall {
            tool_id: "shell".to_owned(),
            params: HashMap::new(),
        };
        assert!(matches!(
            tool.execute_tool_call(&bad, &cancel).await,
            Err(ToolError::InvalidParams { .. })
        ));

        let mut params = HashMap::new();
        params.insert("command".to_owned(), serde_json::json!("echo via-call"));
        let call = ToolCall {
            tool_id: "shell".to_owned(),
            params,
        };
        let output = tool.execute_tool_call(&call, &cancel).await.unwrap().unwrap();
        assert_eq!(output.summary, "via-call");
        let data = output.data.unwrap();
        assert_eq!(data["command"], "echo via-call");
        assert_eq!(data["parsed_command"]["type"], "unknown");
    }

    #[tokio::test]
    async fn padded_command_is_trimmed_everywhere() {
        let (tool, mut rx) = tool();
        let invocation = tool
            .invoke("c6", args("  echo padded \n"), &CancellationToken::new())
            .await
            .unwrap();
        let payload = invocation.payload.unwrap();
        assert_eq!(payload.command, "echo padded");
        assert_eq!(payload.argv, vec!["echo", "padded"]);
        assert_eq!(payload.parsed_command.cmd(), "echo padded");

        let Some(ExecEvent::Begin(begin)) = rx.recv().await else {
            panic!("expected begin event");
        };
        assert_eq!(begin.command, "echo padded");
    }

    #[tokio::test]
    async fn failed_exploration_has_no_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let (tool, _rx) = tool();
        let mut request = args("cat missing.txt");
        request.workdir = Some(dir.path().display().to_string());
        let invocation = tool
            .invoke("c7", request, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!invocation.output.success);
        assert!(matches!(
            invocation.payload.unwrap().parsed_command,
            ParsedCommand::Read { .. }
        ));
        assert!(invocation.output.exploration.is_none());
    }

    struct SlowBroken;

    impl SandboxRunner for SlowBroken {
        fn run<'a>(
            &'a self,
            _request: &'a ExecRequest,
            _cancel: CancellationToken,
        ) -> Pin<Box<dyn Future<Output = Result<SandboxOutput, ToolError>> + Send + 'a>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(250)).await;
                Err(ToolError::infrastructure("shell vanished"))
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn infrastructure_failure_records_duration() {
        let (observer, mut rx) = ChannelObserver::channel(4);
        let tool = ShellTool::new(
            ShellExecutor::from_runner(Arc::new(SlowBroken), Duration::from_secs(30)),
            EventEmitter::new().with_observer(Arc::new(observer)),
        );
        let err = tool
            .invoke("c8", args("ls"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Infrastructure { .. }));

        assert!(matches!(rx.recv().await, Some(ExecEvent::Begin(_))));
        let Some(ExecEvent::End(end)) = rx.recv().await else {
            panic!("expected end event");
        };
        assert!(!end.success);
        assert!(end.stderr.contains("shell vanished"));
        assert!(end.duration_millis >= 250);
    }

    #[test]
    fn details_fall_back_to_formatted_text() {
        let result = ShellCommandResult::exited(1, "only stdout", "");
        let output = tool_output(&result, "only stdout");
        assert_eq!(output.error_details.as_deref(), Some("only stdout"));
    }
}
