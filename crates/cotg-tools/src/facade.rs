//! Narrow contract through which tools reach the workspace.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{ShellConfig, ToolsConfig};
use crate::executor::ToolError;
use crate::shell::sandbox::{ProcessSandbox, SandboxRunner};

const IGNORED_DIRS: &[&str] = &[".git", ".gradle", "build", "target", "node_modules", ".hg"];

/// Workspace operations available to tools. Injected at construction.
pub trait ToolFacade: Send + Sync {
    /// Line-numbered slice of a text file.
    ///
    /// # Errors
    ///
    /// `NotFound` for missing files, `SandboxViolation` outside allowed roots.
    fn read_file(&self, path: &Path, offset: usize, limit: usize) -> Result<String, ToolError>;

    /// Full content of a file, `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// `SandboxViolation` outside allowed roots, `Execution` on I/O failure.
    fn read_raw(&self, path: &Path) -> Result<Option<String>, ToolError>;

    /// Create or overwrite a file, creating parent directories.
    ///
    /// # Errors
    ///
    /// `SandboxViolation` outside allowed roots, `Execution` on I/O failure.
    fn write_file(&self, path: &Path, content: &str) -> Result<(), ToolError>;

    /// # Errors
    ///
    /// `NotFound` for missing files, `SandboxViolation` outside allowed roots.
    fn delete_file(&self, path: &Path) -> Result<(), ToolError>;

    /// # Errors
    ///
    /// `NotFound` when `from` is missing, `SandboxViolation` when either path
    /// is outside allowed roots.
    fn rename_file(&self, from: &Path, to: &Path) -> Result<(), ToolError>;

    /// Directory entries, directories suffixed with `/`.
    ///
    /// # Errors
    ///
    /// `NotFound` for missing directories, `SandboxViolation` outside allowed roots.
    fn list_files(&self, path: &Path, offset: usize, limit: usize)
    -> Result<Vec<String>, ToolError>;

    /// Regex matches as `path:line:text`.
    ///
    /// # Errors
    ///
    /// `InvalidParams` for a bad pattern, `SandboxViolation` outside allowed roots.
    fn search_files(
        &self,
        pattern: &str,
        path: &Path,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<String>, ToolError>;

    /// Runner used for shell commands.
    fn shell(&self) -> Arc<dyn SandboxRunner>;
}

/// [`ToolFacade`] over the local file system, confined to allowed roots.
pub struct LocalFacade {
    root: PathBuf,
    allowed_paths: Vec<PathBuf>,
    shell: Arc<dyn SandboxRunner>,
}

impl std::fmt::Debug for LocalFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFacade")
            .field("root", &self.root)
            .field("allowed_paths", &self.allowed_paths)
            .finish_non_exhaustive()
    }
}

impl LocalFacade {
    /// Facade resolving relative paths against `root`. An empty
    /// `allowed_paths` confines tools to `root`.
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        allowed_paths: Vec<PathBuf>,
        shell: Arc<dyn SandboxRunner>,
    ) -> Self {
        let root = root.into();
        let paths = if allowed_paths.is_empty() {
            vec![root.clone()]
        } else {
            allowed_paths
        };
        Self {
            root: root.canonicalize().unwrap_or(root),
            allowed_paths: paths
                .into_iter()
                .map(|p| p.canonicalize().unwrap_or(p))
                .collect(),
            shell,
        }
    }

    /// Facade rooted at `root` with a [`ProcessSandbox`] built from `shell`.
    #[must_use]
    pub fn rooted(root: impl Into<PathBuf>, shell: &ShellConfig) -> Self {
        Self::new(root, Vec::new(), Arc::new(ProcessSandbox::new(shell)))
    }

    /// Facade rooted at the current directory.
    #[must_use]
    pub fn from_config(config: &ToolsConfig) -> Self {
        let root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::new(
            root,
            config.files.allowed_paths.iter().map(PathBuf::from).collect(),
            Arc::new(ProcessSandbox::new(&config.shell)),
        )
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn validate_path(&self, path: &Path) -> Result<PathBuf, ToolError> {
        let resolved = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let canonical = resolve_via_ancestors(&resolved);
        if !self.allowed_paths.iter().any(|a| canonical.starts_with(a)) {
            return Err(ToolError::SandboxViolation {
                path: canonical.display().to_string(),
            });
        }
        Ok(canonical)
    }

    fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

impl ToolFacade for LocalFacade {
    fn read_file(&self, path: &Path, offset: usize, limit: usize) -> Result<String, ToolError> {
        let path = self.validate_path(path)?;
        if !path.is_file() {
            return Err(not_found(&path));
        }
        let content = std::fs::read_to_string(&path)?;
        let selected: Vec<String> = content
            .lines()
            .skip(offset)
            .take(limit)
            .enumerate()
            .map(|(i, line)| format!("{:>4}\t{line}", offset + i + 1))
            .collect();
        Ok(selected.join("\n"))
    }

    fn read_raw(&self, path: &Path) -> Result<Option<String>, ToolError> {
        let path = self.validate_path(path)?;
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(&path)?))
    }

    fn write_file(&self, path: &Path, content: &str) -> Result<(), ToolError> {
        let path = self.validate_path(path)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(())
    }

    fn delete_file(&self, path: &Path) -> Result<(), ToolError> {
        let path = self.validate_path(path)?;
        if !path.is_file() {
            return Err(not_found(&path));
        }
        std::fs::remove_file(&path)?;
        Ok(())
    }

    fn rename_file(&self, from: &Path, to: &Path) -> Result<(), ToolError> {
        let from = self.validate_path(from)?;
        let to = self.validate_path(to)?;
        if !from.exists() {
            return Err(not_found(&from));
        }
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(&from, &to)?;
        Ok(())
    }

    fn list_files(
        &self,
        path: &Path,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<String>, ToolError> {
        let path = self.validate_path(path)?;
        if !path.is_dir() {
            return Err(not_found(&path));
        }
        let mut entries: Vec<String> = std::fs::read_dir(&path)?
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_owned();
                if IGNORED_DIRS.contains(&name.as_str()) {
                    return None;
                }
                let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
                Some(if is_dir { format!("{name}/") } else { name })
            })
            .collect();
        entries.sort();
        Ok(entries.into_iter().skip(offset).take(limit).collect())
    }

    fn search_files(
        &self,
        pattern: &str,
        path: &Path,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<String>, ToolError> {
        let path = self.validate_path(path)?;
        let regex = regex::Regex::new(pattern).map_err(|e| ToolError::InvalidParams {
            message: format!("invalid search pattern: {e}"),
        })?;
        let mut results = Vec::new();
        grep_recursive(&path, &regex, &mut results, offset.saturating_add(limit))?;
        Ok(results
            .into_iter()
            .skip(offset)
            .map(|(file, line, text)| format!("{}:{line}:{text}", self.display_path(&file)))
            .collect())
    }

    fn shell(&self) -> Arc<dyn SandboxRunner> {
        Arc::clone(&self.shell)
    }
}

fn not_found(path: &Path) -> ToolError {
    ToolError::NotFound {
        path: path.display().to_string(),
    }
}

/// Canonicalize the longest existing prefix of `path`, then re-append the
/// components that do not exist yet.
fn resolve_via_ancestors(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut missing = Vec::new();
    while !existing.exists() {
        let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
            break;
        };
        missing.push(name);
        existing = parent;
    }
    let mut resolved = existing
        .canonicalize()
        .unwrap_or_else(|_| existing.to_path_buf());
    resolved.extend(missing.iter().rev());
    resolved
}

fn grep_recursive(
    path: &Path,
    regex: &regex::Regex,
    results: &mut Vec<(PathBuf, usize, String)>,
    limit: usize,
) -> Result<(), ToolError> {
    if results.len() >= limit {
        return Ok(());
    }
    if path.is_file() {
        if let Ok(content) = std::fs::read_to_string(path) {
            for (i, line) in content.lines().enumerate() {
                if regex.is_match(line) {
                    results.push((path.to_path_buf(), i + 1, line.to_owned()));
                    if results.len() >= limit {
                        return Ok(());
                    }
                }
            }
        }
    } else if path.is_dir() {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
            .flatten()
            .map(|entry| entry.path())
            .collect();
        entries.sort();
        for p in entries {
            let name = p.file_name().and_then(|n| n.to_str());
            if name.is_some_and(|n| n.starts_with('.') || IGNORED_DIRS.contains(&n)) {
                continue;
            }
            grep_recursive(&p, regex, results, limit)?;
        }
    }
    Ok(())
}
