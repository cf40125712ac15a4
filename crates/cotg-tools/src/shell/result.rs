use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a command stopped before it exited on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Cancellation {
    Requested,
    TimedOut { timeout_millis: u64 },
}

impl fmt::Display for Cancellation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("command cancelled"),
            Self::TimedOut { timeout_millis } => {
                write!(f, "command timed out after {timeout_millis} ms")
            }
        }
    }
}

/// How an execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// The process exited; any exit code is a normal result.
    Completed { exit_code: i32 },
    SandboxRejected,
    Cancelled(Cancellation),
}

/// Outcome of one shell command execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellCommandResult {
    /// Advisory when `sandbox_failure` or `cancellation` is set.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub working_directory: Option<String>,
    pub sandbox_failure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation: Option<Cancellation>,
    pub duration_millis: u64,
}

impl ShellCommandResult {
    #[must_use]
    pub fn exited(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            working_directory: None,
            sandbox_failure: None,
            cancellation: None,
            duration_millis: 0,
        }
    }

    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            sandbox_failure: Some(message.into()),
            ..Self::exited(-1, String::new(), String::new())
        }
    }

    #[must_use]
    pub fn cancelled(
        cancellation: Cancellation,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self {
            cancellation: Some(cancellation),
            ..Self::exited(-1, stdout, stderr)
        }
    }

    #[must_use]
    pub fn with_working_directory(mut self, dir: Option<String>) -> Self {
        self.working_directory = dir;
        self
    }

    #[must_use]
    pub fn with_duration_millis(mut self, millis: u64) -> Self {
        self.duration_millis = millis;
        self
    }

    #[must_use]
    pub fn is_sandbox_failure(&self) -> bool {
        self.sandbox_failure
            .as_deref()
            .is_some_and(|msg| !msg.trim().is_empty())
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_some()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.is_sandbox_failure() && !self.is_cancelled() && self.exit_code == 0
    }

    #[must_use]
    pub fn outcome(&self) -> ExecOutcome {
        if let Some(cancellation) = self.cancellation {
            ExecOutcome::Cancelled(cancellation)
        } else if self.is_sandbox_failure() {
            ExecOutcome::SandboxRejected
        } else {
            ExecOutcome::Completed {
                exit_code: self.exit_code,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_exit_is_success() {
        let result = ShellCommandResult::exited(0, "ok", "");
        assert!(result.is_success());
        assert_eq!(result.outcome(), ExecOutcome::Completed { exit_code: 0 });
    }

    #[test]
    fn nonzero_exit_is_completed_failure() {
        let result = ShellCommandResult::exited(2, "", "no such file");
        assert!(!result.is_success());
        assert_eq!(result.outcome(), ExecOutcome::Completed { exit_code: 2 });
    }

    #[test]
    fn blank_sandbox_message_is_not_failure() {
        let mut result = ShellCommandResult::exited(0, "", "");
        result.sandbox_failure = Some("  \n".to_owned());
        assert!(!result.is_sandbox_failure());
        assert!(result.is_success());
        result.sandbox_failure = Some(String::new());
        assert!(result.is_success());
    }

    #[test]
    fn rejection_is_never_success() {
        let result = ShellCommandResult::rejected("blocked command: sudo");
        assert!(result.is_sandbox_failure());
        assert!(!result.is_success());
        assert_eq!(result.outcome(), ExecOutcome::SandboxRejected);
    }

    #[test]
    fn cancellation_is_distinct_outcome() {
        let result = ShellCommandResult::cancelled(Cancellation::Requested, "partial", "");
        assert_eq!(result.exit_code, -1);
        assert!(!result.is_sandbox_failure());
        assert!(!result.is_success());
        assert_eq!(
            result.outcome(),
            ExecOutcome::Cancelled(Cancellation::Requested)
        );
        assert_eq!(result.stdout, "partial");
    }

    #[test]
    fn cancellation_display() {
        assert_eq!(Cancellation::Requested.to_string(), "command cancelled");
        assert_eq!(
            Cancellation::TimedOut {
                timeout_millis: 1500
            }
            .to_string(),
            "command timed out after 1500 ms"
        );
    }

    #[test]
    fn cancellation_serialization() {
        let json = serde_json::to_string(&Cancellation::TimedOut {
            timeout_millis: 10,
        })
        .unwrap();
        assert_eq!(json, r#"{"reason":"timed_out","timeout_millis":10}"#);
    }

    proptest! {
        #[test]
        fn sandbox_failure_overrides_exit_code(exit_code in any::<i32>(), msg in "[a-z]{1,20}") {
            let mut result = ShellCommandResult::exited(exit_code, "", "");
            result.sandbox_failure = Some(msg);
            prop_assert!(!result.is_success());
        }

        #[test]
        fn success_iff_zero_without_failure(exit_code in -5i32..5) {
            let result = ShellCommandResult::exited(exit_code, "", "");
            prop_assert_eq!(result.is_success(), exit_code == 0);
        }
    }
}
