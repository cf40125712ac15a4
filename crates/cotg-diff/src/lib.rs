//! File change ledger and line-level diff statistics for a single assistant turn.

pub mod change;
pub mod ledger;
pub mod stats;
pub mod tracker;

pub use change::FileChange;
pub use ledger::{ChangeSet, TurnLedger};
pub use stats::{DiffStats, NO_CHANGES_MESSAGE, count_content_lines, count_diff_lines};
pub use tracker::{DiffTracker, normalize_path, unified_diff};
