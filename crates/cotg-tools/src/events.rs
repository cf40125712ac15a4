//! Begin/end notifications for shell command executions.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::shell::parse::ParsedCommand;
use crate::shell::result::Cancellation;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecCommandBegin {
    pub call_id: String,
    pub command: String,
    pub argv: Vec<String>,
    pub parsed_command: ParsedCommand,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecCommandEnd {
    pub call_id: String,
    pub command: String,
    pub argv: Vec<String>,
    pub parsed_command: ParsedCommand,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub formatted_output: String,
    pub sandbox_failure: Option<String>,
    pub duration_millis: u64,
    pub truncated: bool,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation: Option<Cancellation>,
}

/// Transport form of an execution event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecEvent {
    Begin(ExecCommandBegin),
    End(ExecCommandEnd),
}

impl ExecEvent {
    #[must_use]
    pub fn call_id(&self) -> &str {
        match self {
            Self::Begin(begin) => &begin.call_id,
            Self::End(end) => &end.call_id,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("event channel closed")]
    ChannelClosed,

    #[error("event sink failed: {0}")]
    Sink(String),
}

/// Receiver of execution events. Futures may suspend to apply back-pressure.
pub trait ExecEventObserver: Send + Sync {
    fn on_command_begin<'a>(
        &'a self,
        event: &'a ExecCommandBegin,
    ) -> BoxFuture<'a, Result<(), EventError>>;

    fn on_command_end<'a>(
        &'a self,
        event: &'a ExecCommandEnd,
    ) -> BoxFuture<'a, Result<(), EventError>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ExecEventObserver for NoopObserver {
    fn on_command_begin<'a>(
        &'a self,
        _event: &'a ExecCommandBegin,
    ) -> BoxFuture<'a, Result<(), EventError>> {
        Box::pin(async { Ok(()) })
    }

    fn on_command_end<'a>(
        &'a self,
        _event: &'a ExecCommandEnd,
    ) -> BoxFuture<'a, Result<(), EventError>> {
        Box::pin(async { Ok(()) })
    }
}

/// Forwards events into a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::Sender<ExecEvent>,
}

impl ChannelObserver {
    #[must_use]
    pub fn new(tx: mpsc::Sender<ExecEvent>) -> Self {
        Self { tx }
    }

    /// Observer plus the receiving half of a channel holding `capacity` events.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ExecEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    async fn send(&self, event: ExecEvent) -> Result<(), EventError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| EventError::ChannelClosed)
    }
}

impl ExecEventObserver for ChannelObserver {
    fn on_command_begin<'a>(
        &'a self,
        event: &'a ExecCommandBegin,
    ) -> BoxFuture<'a, Result<(), EventError>> {
        Box::pin(self.send(ExecEvent::Begin(event.clone())))
    }

    fn on_command_end<'a>(
        &'a self,
        event: &'a ExecCommandEnd,
    ) -> BoxFuture<'a, Result<(), EventError>> {
        Box::pin(self.send(ExecEvent::End(event.clone())))
    }
}

/// Delivers events to every registered observer in registration order.
#[derive(Clone, Default)]
pub struct EventEmitter {
    observers: Vec<Arc<dyn ExecEventObserver>>,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl EventEmitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ExecEventObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Announce a command. Delivery failures are logged and never stop
    /// the command or its end event.
    pub async fn begin(&self, event: &ExecCommandBegin) {
        for observer in &self.observers {
            if let Err(e) = observer.on_command_begin(event).await {
                tracing::warn!(call_id = %event.call_id, "begin event delivery failed: {e}");
            }
        }
    }

    /// Deliver the end event to all observers.
    ///
    /// # Errors
    ///
    /// Returns the first delivery error; remaining observers are still notified.
    pub async fn end(&self, event: &ExecCommandEnd) -> Result<(), EventError> {
        let mut first_error = None;
        for observer in &self.observers {
            if let Err(e) = observer.on_command_end(event).await {
                tracing::warn!(call_id = %event.call_id, "end event delivery failed: {e}");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
