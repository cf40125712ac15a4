//! Shell command execution: classification, sandboxed running, output
//! bounding, and the `shell` tool that ties them to the event stream.

pub mod executor;
pub mod format;
pub mod handler;
pub mod parse;
pub mod payload;
pub mod result;
pub mod sandbox;

pub use executor::{KILL_GRACE, ShellExecutor};
pub use format::{FormattedOutput, MAX_FORMATTED_OUTPUT_CHARS};
pub use handler::{EMPTY_COMMAND_MESSAGE, ShellCommandArgs, ShellInvocation, ShellTool};
pub use parse::{CommandRisk, ParsedCommand};
pub use payload::ShellCommandPayload;
pub use result::{Cancellation, ExecOutcome, ShellCommandResult};
pub use sandbox::{ExecRequest, ProcessSandbox, ProcessStatus, SandboxOutput, SandboxRunner};
