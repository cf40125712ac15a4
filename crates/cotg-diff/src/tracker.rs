use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use similar::TextDiff;

use crate::change::FileChange;
use crate::ledger::ChangeSet;

const DIFF_CONTEXT_LINES: usize = 3;

/// Detects file changes by comparing disk content against baselines captured
/// before the first mutation of each file in a turn.
#[derive(Debug)]
pub struct DiffTracker {
    project_root: PathBuf,
    baselines: HashMap<PathBuf, Option<String>>,
}

impl DiffTracker {
    #[must_use]
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            baselines: HashMap::new(),
        }
    }

    #[must_use]
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Capture the current content of `path` unless it was already captured
    /// this turn. A missing or unreadable file is recorded as absent.
    pub fn snapshot(&mut self, path: impl AsRef<Path>) {
        let key = normalize_path(path.as_ref());
        if self.baselines.contains_key(&key) {
            return;
        }
        let content = self.read(&key);
        self.baselines.insert(key, content);
    }

    #[must_use]
    pub fn is_tracked(&self, path: impl AsRef<Path>) -> bool {
        self.baselines.contains_key(&normalize_path(path.as_ref()))
    }

    /// Compare every baseline with what is on disk now.
    #[must_use]
    pub fn changes(&self) -> ChangeSet {
        let mut set = ChangeSet::new();
        for (path, before) in &self.baselines {
            let after = self.read(path);
            let change = match (before, after) {
                (None, Some(after)) => FileChange::add(after),
                (Some(before), None) => FileChange::delete(before.clone()),
                (Some(before), Some(after)) if *before != after => {
                    FileChange::update(unified_diff(before, &after, path))
                }
                _ => continue,
            };
            set.record(path.clone(), change);
        }
        set
    }

    /// Forget all baselines, typically at the end of a turn.
    pub fn clear(&mut self) {
        self.baselines.clear();
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    fn read(&self, path: &Path) -> Option<String> {
        let absolute = self.resolve(path);
        if !absolute.is_file() {
            return None;
        }
        match std::fs::read_to_string(&absolute) {
            Ok(content) => Some(content),
            Err(e) => {
                tracing::warn!(path = %absolute.display(), "failed to read tracked file: {e}");
                None
            }
        }
    }
}

/// Unified diff between two versions of `path` with `a/` and `b/` headers.
#[must_use]
pub fn unified_diff(before: &str, after: &str, path: &Path) -> String {
    let display = path.display();
    TextDiff::from_lines(before, after)
        .unified_diff()
        .context_radius(DIFF_CONTEXT_LINES)
        .header(&format!("a/{display}"), &format!("b/{display}"))
        .to_string()
}

/// Ledger key for `path`: `.` components dropped, separators collapsed.
/// `./src/a.kt`, `src//a.kt` and `src/a.kt` share one key.
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let normalized: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    if normalized.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        normalized
    }
}
