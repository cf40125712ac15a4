use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::AsyncWriteExt;

use crate::config::AuditConfig;
use crate::events::{EventError, ExecCommandBegin, ExecCommandEnd, ExecEventObserver};
use crate::shell::result::Cancellation;

type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Writes one JSON line per finished command.
#[derive(Debug)]
pub struct AuditLogger {
    destination: AuditDestination,
}

#[derive(Debug)]
enum AuditDestination {
    Stdout,
    File(tokio::sync::Mutex<tokio::fs::File>),
}

#[derive(Debug, serde::Serialize)]
pub struct AuditEntry {
    pub timestamp: String,
    pub tool: String,
    pub call_id: String,
    pub command: String,
    pub result: AuditResult,
    pub duration_ms: u64,
}

#[derive(Debug, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "type")]
pub enum AuditResult {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "blocked")]
    Blocked { reason: String },
    #[serde(rename = "error")]
    Error { exit_code: i32 },
    #[serde(rename = "timeout")]
    Timeout,
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl AuditResult {
    #[must_use]
    pub fn from_end(event: &ExecCommandEnd) -> Self {
        match (&event.sandbox_failure, event.cancellation) {
            (_, Some(Cancellation::TimedOut { .. })) => Self::Timeout,
            (_, Some(Cancellation::Requested)) => Self::Cancelled,
            (Some(reason), None) if !reason.trim().is_empty() => Self::Blocked {
                reason: reason.clone(),
            },
            _ if event.exit_code == 0 => Self::Success,
            _ => Self::Error {
                exit_code: event.exit_code,
            },
        }
    }
}

impl AuditEntry {
    #[must_use]
    pub fn from_end(tool: &str, event: &ExecCommandEnd) -> Self {
        Self {
            timestamp: unix_timestamp(),
            tool: tool.to_owned(),
            call_id: event.call_id.clone(),
            command: event.command.clone(),
            result: AuditResult::from_end(event),
            duration_ms: event.duration_millis,
        }
    }
}

impl AuditLogger {
    /// Create a new `AuditLogger` from config.
    ///
    /// # Errors
    ///
    /// Returns an error if a file destination cannot be opened.
    pub async fn from_config(config: &AuditConfig) -> Result<Self, std::io::Error> {
        let destination = if config.destination == "stdout" {
            AuditDestination::Stdout
        } else {
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(Path::new(&config.destination))
                .await?;
            AuditDestination::File(tokio::sync::Mutex::new(file))
        };

        Ok(Self { destination })
    }

    /// Append `entry` to the audit destination.
    ///
    /// # Errors
    ///
    /// Returns `EventError::Sink` when the entry cannot be serialized or written.
    pub async fn log(&self, entry: &AuditEntry) -> Result<(), EventError> {
        let json = serde_json::to_string(entry).map_err(|e| EventError::Sink(e.to_string()))?;

        match &self.destination {
            AuditDestination::Stdout => {
                tracing::info!(target: "audit", "{json}");
            }
            AuditDestination::File(file) => {
                let mut f = file.lock().await;
                let line = format!("{json}\n");
                if let Err(e) = f.write_all(line.as_bytes()).await {
                    tracing::error!("failed to write audit log: {e}");
                    return Err(EventError::Sink(e.to_string()));
                }
                f.flush().await.map_err(|e| EventError::Sink(e.to_string()))?;
            }
        }
        Ok(())
    }
}

impl ExecEventObserver for AuditLogger {
    fn on_command_begin<'a>(
        &'a self,
        _event: &'a ExecCommandBegin,
    ) -> BoxFuture<'a, Result<(), EventError>> {
        Box::pin(async { Ok(()) })
    }

    fn on_command_end<'a>(
        &'a self,
        event: &'a ExecCommandEnd,
    ) -> BoxFuture<'a, Result<(), EventError>> {
        Box::pin(async move {
            let entry = AuditEntry::from_end(crate::shell::ShellTool::NAME, event);
            self.log(&entry).await
        })
    }
}

fn unix_timestamp() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{secs}")
}
