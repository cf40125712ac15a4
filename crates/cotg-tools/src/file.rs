use std::path::Path;
use std::sync::Arc;

use cotg_diff::{FileChange, TurnLedger, normalize_path, unified_diff};
use serde::Deserialize;

use crate::config::FilesConfig;
use crate::executor::{
    ExplorationKind, ExplorationMetadata, ToolCall, ToolError, ToolOutput, deserialize_params,
};
use crate::facade::ToolFacade;

const DEFAULT_READ_LIMIT: usize = 2_000;
const DEFAULT_LIST_LIMIT: usize = 500;
const DEFAULT_MAX_SEARCH_RESULTS: usize = 100;

#[derive(Debug, Deserialize)]
struct ReadParams {
    path: String,
    #[serde(default)]
    offset: usize,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct WriteParams {
    path: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct EditParams {
    path: String,
    old_string: String,
    new_string: String,
}

#[derive(Debug, Deserialize)]
struct PathParams {
    path: String,
}

#[derive(Debug, Deserialize)]
struct MoveParams {
    from: String,
    to: String,
}

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default = "default_dir")]
    path: String,
    #[serde(default)]
    offset: usize,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    pattern: String,
    #[serde(default = "default_dir")]
    path: String,
    #[serde(default)]
    offset: usize,
    limit: Option<usize>,
}

fn default_dir() -> String {
    ".".to_owned()
}

/// File tools applied through a [`ToolFacade`]. Mutations that succeed are
/// recorded in the turn's [`TurnLedger`].
#[derive(Clone)]
pub struct FileTools {
    facade: Arc<dyn ToolFacade>,
    ledger: TurnLedger,
    max_search_results: usize,
}

impl std::fmt::Debug for FileTools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTools")
            .field("max_search_results", &self.max_search_results)
            .finish_non_exhaustive()
    }
}

impl FileTools {
    #[must_use]
    pub fn new(facade: Arc<dyn ToolFacade>, ledger: TurnLedger) -> Self {
        Self {
            facade,
            ledger,
            max_search_results: DEFAULT_MAX_SEARCH_RESULTS,
        }
    }

    /// File tools honoring the search cap from `config`.
    #[must_use]
    pub fn from_config(
        facade: Arc<dyn ToolFacade>,
        ledger: TurnLedger,
        config: &FilesConfig,
    ) -> Self {
        Self::new(facade, ledger).with_max_search_results(config.max_search_results)
    }

    #[must_use]
    pub fn with_max_search_results(mut self, max: usize) -> Self {
        self.max_search_results = max;
        self
    }

    #[must_use]
    pub fn ledger(&self) -> &TurnLedger {
        &self.ledger
    }

    /// Execute a tool call by `tool_id`. Returns `Ok(None)` for tools this
    /// set does not provide.
    ///
    /// # Errors
    ///
    /// Returns `ToolError` on invalid params, sandbox violations, missing
    /// files or I/O failures.
    pub async fn execute_tool_call(&self, call: &ToolCall) -> Result<Option<ToolOutput>, ToolError> {
        let output = match call.tool_id.as_str() {
            "read" => self.read(deserialize_params(&call.params)?)?,
            "write" => {
                let p: WriteParams = deserialize_params(&call.params)?;
                self.write(&p.path, &p.content).await?
            }
            "edit" => {
                let p: EditParams = deserialize_params(&call.params)?;
                self.edit(&p.path, &p.old_string, &p.new_string).await?
            }
            "delete" => {
                let p: PathParams = deserialize_params(&call.params)?;
                self.delete(&p.path).await?
            }
            "move" => {
                let p: MoveParams = deserialize_params(&call.params)?;
                self.rename(&p.from, &p.to).await?
            }
            "list" => self.list(deserialize_params(&call.params)?)?,
            "search" => self.search(deserialize_params(&call.params)?)?,
            _ => return Ok(None),
        };
        Ok(Some(output))
    }

    /// Create or overwrite `path`.
    ///
    /// # Errors
    ///
    /// Returns `ToolError` when the facade rejects or fails the write.
    pub async fn write(&self, path: &str, content: &str) -> Result<ToolOutput, ToolError> {
        let target = Path::new(path);
        let before = self.facade.read_raw(target)?;
        self.facade.write_file(target, content)?;

        let change = match before {
            None => Some(FileChange::add(content)),
            Some(before) if before != content => {
                Some(FileChange::update(unified_diff(&before, content, target)))
            }
            Some(_) => None,
        };
        if let Some(change) = change {
            self.ledger.record(normalize_path(target), change).await;
        }
        Ok(ToolOutput::success(
            "write",
            format!("Wrote {} bytes to {path}", content.len()),
        ))
    }

    /// Replace the first occurrence of `old` in `path` with `new`.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::NotFound` for a missing file and
    /// `ToolError::InvalidParams` when `old` does not occur.
    pub async fn edit(&self, path: &str, old: &str, new: &str) -> Result<ToolOutput, ToolError> {
        let target = Path::new(path);
        let before = self.facade.read_raw(target)?.ok_or_else(|| ToolError::NotFound {
            path: path.to_owned(),
        })?;
        if old.is_empty() || !before.contains(old) {
            return Err(ToolError::InvalidParams {
                message: format!("old_string not found in {path}"),
            });
        }
        let after = before.replacen(old, new, 1);
        self.facade.write_file(target, &after)?;
        if after != before {
            self.ledger
                .record(
                    normalize_path(target),
                    FileChange::update(unified_diff(&before, &after, target)),
                )
                .await;
        }
        Ok(ToolOutput::success("edit", format!("Edited {path}")))
    }

    /// # Errors
    ///
    /// Returns `ToolError::NotFound` for a missing file.
    pub async fn delete(&self, path: &str) -> Result<ToolOutput, ToolError> {
        let target = Path::new(path);
        let before = self.facade.read_raw(target)?.ok_or_else(|| ToolError::NotFound {
            path: path.to_owned(),
        })?;
        self.facade.delete_file(target)?;
        self.ledger
            .record(normalize_path(target), FileChange::delete(before))
            .await;
        Ok(ToolOutput::success("delete", format!("Deleted {path}")))
    }

    /// Move `from` to `to`, recorded under the source path.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::NotFound` for a missing source.
    pub async fn rename(&self, from: &str, to: &str) -> Result<ToolOutput, ToolError> {
        self.facade.rename_file(Path::new(from), Path::new(to))?;
        self.ledger
            .record(
                normalize_path(Path::new(from)),
                FileChange::moved(String::new(), normalize_path(Path::new(to))),
            )
            .await;
        Ok(ToolOutput::success("move", format!("Moved {from} to {to}")))
    }

    fn read(&self, p: ReadParams) -> Result<ToolOutput, ToolError> {
        let text = self.facade.read_file(
            Path::new(&p.path),
            p.offset,
            p.limit.unwrap_or(DEFAULT_READ_LIMIT),
        )?;
        Ok(ToolOutput::success("read", text).with_exploration(Some(ExplorationMetadata {
            kind: ExplorationKind::Read,
            items: vec![p.path],
            query: None,
            path: None,
        })))
    }

    fn list(&self, p: ListParams) -> Result<ToolOutput, ToolError> {
        let entries = self.facade.list_files(
            Path::new(&p.path),
            p.offset,
            p.limit.unwrap_or(DEFAULT_LIST_LIMIT),
        )?;
        let summary = if entries.is_empty() {
            format!("{} is empty", p.path)
        } else {
            entries.join("\n")
        };
        Ok(ToolOutput::success("list", summary).with_exploration(Some(ExplorationMetadata {
            kind: ExplorationKind::List,
            items: entries,
            query: None,
            path: Some(p.path),
        })))
    }

    fn search(&self, p: SearchParams) -> Result<ToolOutput, ToolError> {
        let limit = p
            .limit
            .unwrap_or(self.max_search_results)
            .min(self.max_search_results);
        let hits = self
            .facade
            .search_files(&p.pattern, Path::new(&p.path), p.offset, limit)?;
        let summary = if hits.is_empty() {
            format!("No matches for: {}", p.pattern)
        } else {
            hits.join("\n")
        };
        Ok(ToolOutput::success("search", summary).with_exploration(Some(ExplorationMetadata {
            kind: ExplorationKind::Search,
            items: Vec::new(),
            query: Some(p.pattern),
            path: Some(p.path),
        })))
    }
}
