//! Delta history: the append-only record of every delta run's findings.
//!
//! Entries are never removed. When a newer run re-analyzes a range that an
//! older entry came from, the older entry is marked `superseded_by` the newer
//! head commit.

use serde::{Deserialize, Serialize};

use crate::domain::delta::{DeltaFinding, HunkRange};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeltaHistory {
    pub entries: Vec<DeltaFinding>,
}

impl DeltaHistory {
    /// Entries not superseded by any later run.
    pub fn active(&self) -> impl Iterator<Item = &DeltaFinding> {
        self.entries.iter().filter(|e| e.superseded_by.is_none())
    }

    /// Append one run's delta findings.
    ///
    /// `covered` lists the `(file, range)` pairs that run re-analyzed; active
    /// entries overlapping any of them are marked superseded by `head`.
    pub fn append(
        &self,
        head: &str,
        covered: &[(String, Vec<HunkRange>)],
        fresh: &[DeltaFinding],
    ) -> Self {
        let mut entries = self.entries.clone();
        for entry in entries.iter_mut().filter(|e| e.superseded_by.is_none()) {
            let file = &entry.item.finding.file;
            let overlaps = covered
                .iter()
                .filter(|(path, _)| path == file)
                .any(|(_, ranges)| ranges.iter().any(|r| r.overlaps(&entry.hunk_range)));
            if overlaps {
                entry.superseded_by = Some(head.to_string());
            }
        }
        entries.extend(fresh.iter().cloned());
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::finding::{Finding, Severity};
    use crate::domain::scored::ScoredItem;

    fn delta(file: &str, line: u32, head: &str, range: (u32, u32)) -> DeltaFinding {
        DeltaFinding {
            item: ScoredItem {
                finding: Finding::new("t", file, line, "R", Severity::Low, "m"),
                difficulty: 1,
                value: 1,
                estimated_hours: 0.5,
            },
            base_commit: "b".to_string(),
            head_commit: head.to_string(),
            hunk_range: HunkRange {
                start: range.0,
                end: range.1,
            },
            superseded_by: None,
        }
    }

    #[test]
    fn later_run_supersedes_overlapping_entries() {
        let first = DeltaHistory::default().append(
            "h1",
            &[("a.py".to_string(), vec![HunkRange { start: 1, end: 5 }])],
            &[delta("a.py", 2, "h1", (1, 5)), delta("b.py", 9, "h1", (9, 9))],
        );
        let second = first.append(
            "h2",
            &[("a.py".to_string(), vec![HunkRange { start: 4, end: 6 }])],
            &[delta("a.py", 4, "h2", (4, 6))],
        );

        assert_eq!(second.entries.len(), 3);
        assert_eq!(second.entries[0].superseded_by.as_deref(), Some("h2"));
        assert_eq!(second.entries[1].superseded_by, None);
        let active: Vec<_> = second.active().map(|e| e.head_commit.as_str()).collect();
        assert_eq!(active, vec!["h1", "h2"]);
    }

    #[test]
    fn entries_are_never_removed() {
        let history = DeltaHistory::default().append("h1", &[], &[delta("a.py", 1, "h1", (1, 1))]);
        let covered = vec![("a.py".to_string(), vec![HunkRange { start: 1, end: 1 }])];
        let next = history.append("h2", &covered, &[]);
        assert_eq!(next.entries.len(), 1);
        assert_eq!(next.active().count(), 0);
        // the input history is untouched
        assert_eq!(history.active().count(), 1);
    }
}
