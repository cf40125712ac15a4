use serde::{Deserialize, Serialize};

use super::format::FormattedOutput;
use super::parse::ParsedCommand;
use super::result::{Cancellation, ShellCommandResult};

/// Report form of a finished shell command, as sent over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellCommandPayload {
    pub command: String,
    pub argv: Vec<String>,
    pub parsed_command: ParsedCommand,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub working_directory: Option<String>,
    pub formatted_output: String,
    pub truncated: bool,
    pub sandbox_failure: Option<String>,
    pub duration_millis: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation: Option<Cancellation>,
}

impl ShellCommandPayload {
    #[must_use]
    pub fn new(
        command: impl Into<String>,
        argv: Vec<String>,
        parsed_command: ParsedCommand,
        result: ShellCommandResult,
        formatted: FormattedOutput,
    ) -> Self {
        Self {
            command: command.into(),
            argv,
            parsed_command,
            stdout: result.stdout,
            stderr: result.stderr,
            exit_code: result.exit_code,
            working_directory: result.working_directory,
            formatted_output: formatted.text,
            truncated: formatted.truncated,
            sandbox_failure: result.sandbox_failure,
            duration_millis: result.duration_millis,
            cancellation: result.cancellation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::{format, parse};

    fn payload(result: ShellCommandResult) -> ShellCommandPayload {
        let command = "ls src";
        let argv = parse::tokenize(command);
        let parsed = parse::classify(command, &argv);
        let formatted = format::format(&result);
        ShellCommandPayload::new(command, argv, parsed, result, formatted)
    }

    #[test]
    fn wire_field_names() {
        let result = ShellCommandResult::exited(0, "main.rs", "")
            .with_working_directory(Some("/work".to_owned()))
            .with_duration_millis(7);
        let json = serde_json::to_value(payload(result)).unwrap();
        let mut keys: Vec<&str> = json
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "argv",
                "command",
                "duration_millis",
                "exit_code",
                "formatted_output",
                "parsed_command",
                "sandbox_failure",
                "stderr",
                "stdout",
                "truncated",
                "working_directory",
            ]
        );
        assert_eq!(json["parsed_command"]["type"], "list_files");
        assert_eq!(json["formatted_output"], "main.rs");
    }

    #[test]
    fn cancellation_emitted_when_present() {
        let result = ShellCommandResult::cancelled(Cancellation::Requested, "", "");
        let json = serde_json::to_value(payload(result)).unwrap();
        assert_eq!(json["cancellation"]["reason"], "requested");
        assert_eq!(json["exit_code"], -1);
    }
}
