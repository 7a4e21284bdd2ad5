//! Delta-run records.

use serde::{Deserialize, Serialize};

use super::scored::ScoredItem;

/// Inclusive range of new-side line numbers touched by a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HunkRange {
    pub start: u32,
    pub end: u32,
}

impl HunkRange {
    /// Build a range from a start line and a line count.
    ///
    /// A zero count (pure deletion) anchors at `max(start, 1)`.
    pub fn from_start_count(start: u32, count: u32) -> Self {
        let start = start.max(1);
        let end = if count == 0 {
            start
        } else {
            start.saturating_add(count - 1)
        };
        Self { start, end }
    }

    pub fn contains(&self, line: u32) -> bool {
        self.start <= line && line <= self.end
    }

    pub fn overlaps(&self, other: &HunkRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// A scored finding produced inside a changed hunk during a delta run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaFinding {
    pub item: ScoredItem,
    pub base_commit: String,
    pub head_commit: String,
    pub hunk_range: HunkRange,

    /// Head commit of the later delta run that covered the same range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
}

/// Stored scored result of a completed run, read as the prior of a delta run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSnapshot {
    /// Commit the snapshot describes (the last reviewed commit).
    pub commit: Option<String>,

    /// Digest of the configuration the snapshot was scored with.
    pub config_digest: String,

    /// Normalized scored items.
    pub items: Vec<ScoredItem>,
}
