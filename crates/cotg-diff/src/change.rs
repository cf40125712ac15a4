use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::stats::{count_content_lines, count_diff_lines};

/// Net effect of tool activity on a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileChange {
    /// File created with full content.
    Add { content: String },
    /// File removed. Content is kept for statistics and undo.
    Delete { content: String },
    /// Existing file modified, optionally moved to `move_path`.
    Update {
        unified_diff: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        move_path: Option<PathBuf>,
    },
}

impl FileChange {
    #[must_use]
    pub fn add(content: impl Into<String>) -> Self {
        Self::Add {
            content: content.into(),
        }
    }

    #[must_use]
    pub fn delete(content: impl Into<String>) -> Self {
        Self::Delete {
            content: content.into(),
        }
    }

    #[must_use]
    pub fn update(unified_diff: impl Into<String>) -> Self {
        Self::Update {
            unified_diff: unified_diff.into(),
            move_path: None,
        }
    }

    #[must_use]
    pub fn moved(unified_diff: impl Into<String>, target: impl Into<PathBuf>) -> Self {
        Self::Update {
            unified_diff: unified_diff.into(),
            move_path: Some(target.into()),
        }
    }

    /// Lines this change adds.
    #[must_use]
    pub fn added_lines(&self) -> usize {
        match self {
            Self::Add { content } => count_content_lines(content),
            Self::Delete { .. } => 0,
            Self::Update { unified_diff, .. } => count_diff_lines(unified_diff).0,
        }
    }

    /// Lines this change removes.
    #[must_use]
    pub fn removed_lines(&self) -> usize {
        match self {
            Self::Add { .. } => 0,
            Self::Delete { content } => count_content_lines(content),
            Self::Update { unified_diff, .. } => count_diff_lines(unified_diff).1,
        }
    }

    /// Short verb used in per-file listings.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Add { .. } => "created".to_owned(),
            Self::Delete { .. } => "deleted".to_owned(),
            Self::Update {
                move_path: Some(target),
                ..
            } => format!("moved to {}", target.display()),
            Self::Update { move_path: None, .. } => "edited".to_owned(),
        }
    }
}
