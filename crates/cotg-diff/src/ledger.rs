use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::change::FileChange;
use crate::stats::DiffStats;

/// Most recent change per path, ordered by path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeSet {
    changes: BTreeMap<PathBuf, FileChange>,
}

impl ChangeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `path`. Returns the superseded change.
    pub fn record(&mut self, path: impl Into<PathBuf>, change: FileChange) -> Option<FileChange> {
        self.changes.insert(path.into(), change)
    }

    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&FileChange> {
        self.changes.get(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &FileChange)> {
        self.changes.iter().map(|(p, c)| (p.as_path(), c))
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }

    #[must_use]
    pub fn stats(&self) -> DiffStats {
        self.changes.values().fold(
            DiffStats {
                file_count: self.changes.len(),
                ..DiffStats::default()
            },
            |mut acc, change| {
                acc.added_lines += change.added_lines();
                acc.removed_lines += change.removed_lines();
                acc
            },
        )
    }

    #[must_use]
    pub fn summarize(&self) -> String {
        self.stats().summary()
    }

    /// One line per file: `path (label) +added -removed`.
    #[must_use]
    pub fn describe(&self) -> Vec<String> {
        self.iter()
            .map(|(path, change)| {
                format!(
                    "{} ({}) +{} -{}",
                    path.display(),
                    change.label(),
                    change.added_lines(),
                    change.removed_lines()
                )
            })
            .collect()
    }
}

impl FromIterator<(PathBuf, FileChange)> for ChangeSet {
    fn from_iter<T: IntoIterator<Item = (PathBuf, FileChange)>>(iter: T) -> Self {
        let mut set = Self::new();
        for (path, change) in iter {
            set.record(path, change);
        }
        set
    }
}

/// Shared per-turn ledger.
///
/// Clones share state. `record` takes the write lock so concurrent tool calls
/// in one turn never lose updates; queries take the read lock.
#[derive(Debug, Clone, Default)]
pub struct TurnLedger {
    inner: Arc<RwLock<ChangeSet>>,
}

impl TurnLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, path: impl Into<PathBuf>, change: FileChange) {
        let path = path.into();
        let mut set = self.inner.write().await;
        if set.record(path.clone(), change).is_some() {
            tracing::debug!(path = %path.display(), "superseded earlier change");
        } else {
            tracing::debug!(path = %path.display(), "recorded change");
        }
    }

    pub async fn stats(&self) -> DiffStats {
        self.inner.read().await.stats()
    }

    pub async fn summary(&self) -> String {
        self.inner.read().await.summarize()
    }

    pub async fn snapshot(&self) -> ChangeSet {
        self.inner.read().await.clone()
    }

    /// End the turn: take the accumulated changes, leaving the ledger empty.
    pub async fn finish(&self) -> ChangeSet {
        std::mem::take(&mut *self.inner.write().await)
    }
}
