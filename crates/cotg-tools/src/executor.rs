use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Structured tool invocation from the assistant.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub tool_id: String,
    pub params: HashMap<String, serde_json::Value>,
}

/// What an exploration command looked at, for compact transcript rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplorationKind {
    Read,
    List,
    Search,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorationMetadata {
    pub kind: ExplorationKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Structured result handed back to the assistant.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub tool_name: String,
    pub success: bool,
    pub summary: String,
    pub error_details: Option<String>,
    pub data: Option<serde_json::Value>,
    pub exploration: Option<ExplorationMetadata>,
}

impl ToolOutput {
    #[must_use]
    pub fn success(tool_name: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            summary: summary.into(),
            error_details: None,
            data: None,
            exploration: None,
        }
    }

    #[must_use]
    pub fn failure(
        tool_name: impl Into<String>,
        summary: impl Into<String>,
        error_details: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            summary: summary.into(),
            error_details: Some(error_details.into()),
            data: None,
            exploration: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_exploration(mut self, exploration: Option<ExplorationMetadata>) -> Self {
        self.exploration = exploration;
        self
    }
}

impl fmt::Display for ToolOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary)
    }
}

/// Errors that can occur during tool execution.
///
/// Command failures, sandbox rejections and cancellations are results, not
/// errors. Only faults of the tool machinery itself end up here.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("path not allowed by sandbox: {path}")]
    SandboxViolation { path: String },

    #[error("invalid tool parameters: {message}")]
    InvalidParams { message: String },

    #[error("file not found: {path}")]
    NotFound { path: String },

    #[error("sandbox unavailable: {message}")]
    Infrastructure { message: String },

    #[error("execution failed: {0}")]
    Execution(#[from] std::io::Error),
}

impl ToolError {
    pub(crate) fn infrastructure(message: impl Into<String>) -> Self {
        Self::Infrastructure {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }
}

/// Deserialize tool call params from a `HashMap<String, Value>` into a typed struct.
///
/// # Errors
///
/// Returns `ToolError::InvalidParams` when deserialization fails.
pub fn deserialize_params<T: serde::de::DeserializeOwned, S: std::hash::BuildHasher>(
    params: &HashMap<String, serde_json::Value, S>,
) -> Result<T, ToolError> {
    let obj =
        serde_json::Value::Object(params.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    serde_json::from_value(obj).map_err(|e| ToolError::InvalidParams {
        message: e.to_string(),
    })
}
