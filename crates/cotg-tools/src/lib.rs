//! Tool execution core: sandboxed shell commands, file tools, and the event
//! stream that reports them.

pub mod audit;
pub mod config;
pub mod events;
pub mod executor;
pub mod facade;
pub mod file;
pub mod policy;
pub mod shell;

pub use audit::{AuditEntry, AuditLogger, AuditResult};
pub use config::{AuditConfig, FilesConfig, ShellConfig, ToolsConfig};
pub use events::{
    ChannelObserver, EventEmitter, EventError, ExecCommandBegin, ExecCommandEnd, ExecEvent,
    ExecEventObserver, NoopObserver,
};
pub use executor::{
    ExplorationKind, ExplorationMetadata, ToolCall, ToolError, ToolOutput, deserialize_params,
};
pub use facade::{LocalFacade, ToolFacade};
pub use file::FileTools;
pub use policy::{PermissionAction, PermissionRule, SandboxPolicy};
pub use shell::{
    Cancellation, ExecOutcome, ExecRequest, ParsedCommand, ProcessSandbox, SandboxRunner,
    ShellCommandArgs, ShellCommandPayload, ShellCommandResult, ShellExecutor, ShellInvocation,
    ShellTool,
};
