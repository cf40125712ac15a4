use std::fmt;

use serde::{Deserialize, Serialize};

/// Message produced by [`DiffStats::summary`] when nothing changed.
pub const NO_CHANGES_MESSAGE: &str = "No changes";

/// Aggregate line statistics for a set of file changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub file_count: usize,
    pub added_lines: usize,
    pub removed_lines: usize,
}

impl DiffStats {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.file_count == 0
    }

    /// One-line human summary, e.g. `Edited 2 files (+10 -3)`.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return NO_CHANGES_MESSAGE.to_owned();
        }
        let noun = if self.file_count == 1 { "file" } else { "files" };
        format!(
            "Edited {} {noun} (+{} -{})",
            self.file_count, self.added_lines, self.removed_lines
        )
    }
}

impl fmt::Display for DiffStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Number of lines in `content`, split on `\n`.
///
/// The empty piece after a final line terminator is not a line, so `"a\nb\n"`
/// and `"a\nb"` both count as 2. Empty content counts as 0.
#[must_use]
pub fn count_content_lines(content: &str) -> usize {
    if content.is_empty() {
        return 0;
    }
    let pieces = content.split('\n').count();
    if content.ends_with('\n') {
        pieces - 1
    } else {
        pieces
    }
}

/// `(added, removed)` line counts of a textual unified diff.
///
/// `+++` / `---` file headers are skipped; every other line starting with `+`
/// or `-` is counted. Hunk headers, context and garbage are ignored.
#[must_use]
pub fn count_diff_lines(unified_diff: &str) -> (usize, usize) {
    let mut added = 0;
    let mut removed = 0;
    for line in unified_diff.lines() {
        if line.starts_with("+++") || line.starts_with("---") {
            continue;
        }
        if line.starts_with('+') {
            added += 1;
        } else if line.starts_with('-') {
            removed += 1;
        }
    }
    (added, removed)
}
