//! Delta merge: combine a prior scored set with freshly re-analyzed findings.
//!
//! [`merge`] is a pure function of its inputs. The prior set is only read;
//! the merged set is a new collection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::diff::{DiffScope, FileChange, WHOLE_FILE};
use crate::domain::delta::{DeltaFinding, HunkRange};
use crate::domain::finding::FindingKey;
use crate::domain::scored::ScoredItem;
use crate::normalize::normalize_scored;

/// A collision resolved deterministically during the merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResolution {
    pub key: FindingKey,

    /// Number of records that shared `key` before collapsing.
    pub candidates: usize,

    /// How the survivor was chosen.
    pub policy: String,
}

/// Result of merging one delta run into its prior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeOutcome {
    /// The full, normalized scored set after this run.
    pub merged: Vec<ScoredItem>,

    /// Fresh items inside changed hunks.
    pub added: Vec<DeltaFinding>,

    /// Prior items replaced because their line was re-analyzed.
    pub superseded: Vec<ScoredItem>,

    /// Prior items in deleted files.
    pub dropped: Vec<ScoredItem>,

    /// Prior items carried over (including re-pathed ones).
    pub carried: usize,

    /// Prior items moved to a renamed file's new path.
    pub repathed: usize,

    /// Carried items whose line moved because of edits above them.
    #[serde(default)]
    pub shifted: usize,

    /// Fresh items outside any hunk.
    pub ignored: usize,

    pub resolutions: Vec<MergeResolution>,
}

impl MergeOutcome {
    /// No prior record changed and nothing new was found.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
            && self.superseded.is_empty()
            && self.dropped.is_empty()
            && self.repathed == 0
            && self.shifted == 0
    }
}

fn hunk_for(change: &FileChange, line: u32) -> HunkRange {
    if change.whole_file {
        return WHOLE_FILE;
    }
    change
        .hunks
        .iter()
        .find(|h| h.contains(line))
        .or_else(|| change.hunks.first())
        .copied()
        .unwrap_or(WHOLE_FILE)
}

/// Merge `fresh` results for `scope` into `prior`.
///
/// - prior items in deleted files are dropped;
/// - prior items in renamed files move to the new path;
/// - prior items on base lines a hunk rewrote or deleted, anywhere in a
///   whole-file change, file-level, or landing on a re-analyzed line are
///   superseded;
/// - fresh items inside hunks are added; fresh items elsewhere are ignored;
/// - everything else carries over, its line mapped through the hunks above it.
pub fn merge(prior: &[ScoredItem], fresh: &[ScoredItem], scope: &DiffScope) -> MergeOutcome {
    let mut kept: Vec<ScoredItem> = Vec::with_capacity(prior.len() + fresh.len());
    let mut superseded = Vec::new();
    let mut dropped = Vec::new();
    let mut repathed = 0usize;
    let mut shifted = 0usize;

    for item in prior {
        let path = item.finding.file.as_str();
        if scope.is_deleted(path) {
            dropped.push(item.clone());
            continue;
        }
        let mut item = item.clone();
        if let Some(new_path) = scope.renamed_to(path) {
            item.finding.file = new_path.to_string();
            repathed += 1;
        }
        let Some(change) = scope.get(&item.finding.file) else {
            kept.push(item);
            continue;
        };
        if change.replaces_base(item.finding.line) {
            superseded.push(item);
            continue;
        }
        let line = change.map_base_line(item.finding.line);
        if change.covers(line) {
            superseded.push(item);
            continue;
        }
        if line != item.finding.line {
            item.finding.line = line;
            shifted += 1;
        }
        kept.push(item);
    }
    let carried = kept.len();

    let mut added = Vec::new();
    let mut ignored = 0usize;
    for item in fresh {
        match scope.get(&item.finding.file) {
            Some(change) if change.covers(item.finding.line) => {
                added.push(DeltaFinding {
                    item: item.clone(),
                    base_commit: scope.base_commit.clone(),
                    head_commit: scope.head_commit.clone(),
                    hunk_range: hunk_for(change, item.finding.line),
                    superseded_by: None,
                });
                kept.push(item.clone());
            }
            _ => ignored += 1,
        }
    }

    let mut counts: BTreeMap<FindingKey, usize> = BTreeMap::new();
    for item in &kept {
        *counts.entry(item.finding.key()).or_default() += 1;
    }
    let resolutions = counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(key, candidates)| MergeResolution {
            key,
            candidates,
            policy: "kept richest record, unioned tags".to_string(),
        })
        .collect();

    added.sort_by(|a, b| a.item.finding.report_order(&b.item.finding));
    added.dedup_by(|a, b| a.item.finding.key() == b.item.finding.key());

    MergeOutcome {
        merged: normalize_scored(kept),
        added,
        superseded,
        dropped,
        carried,
        repathed,
        shifted,
        ignored,
        resolutions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::diff::ChangeStatus;
    use crate::domain::finding::{Finding, Severity};

    fn item(file: &str, line: u32, rule: &str) -> ScoredItem {
        ScoredItem {
            finding: Finding::new("t", file, line, rule, Severity::Medium, "m"),
            difficulty: 2,
            value: 3,
            estimated_hours: 1.0,
        }
    }

    fn scope(files: Vec<FileChange>) -> DiffScope {
        DiffScope {
            base_commit: "base".to_string(),
            head_commit: "head".to_string(),
            working_tree: false,
            files,
        }
    }

    /// `(old_start, old_count, new_start, new_count)` per hunk.
    fn modified(path: &str, hunks: &[(u32, u32, u32, u32)]) -> FileChange {
        let mut c = FileChange::new(path, ChangeStatus::Modified);
        for &(os, oc, ns, nc) in hunks {
            c.push_hunk(os, oc, ns, nc);
        }
        c
    }

    fn lines(out: &MergeOutcome) -> Vec<(&str, u32, &str)> {
        out.merged
            .iter()
            .map(|i| (i.finding.file.as_str(), i.finding.line, i.finding.rule_id.as_str()))
            .collect()
    }

    #[test]
    fn empty_scope_returns_prior_unchanged() {
        let prior = normalize_scored(vec![item("a.py", 1, "R"), item("b.py", 5, "S")]);
        let out = merge(&prior, &[], &scope(vec![]));
        assert_eq!(out.merged, prior);
        assert!(out.added.is_empty());
        assert!(out.is_noop());
        assert_eq!(out.carried, 2);
    }

    #[test]
    fn only_findings_inside_hunk_are_replaced() {
        let prior = vec![item("f.py", 3, "OLD"), item("f.py", 10, "KEEP"), item("g.py", 10, "G")];
        let fresh = vec![item("f.py", 10, "NEW"), item("f.py", 30, "OUTSIDE")];
        let out = merge(&prior, &fresh, &scope(vec![modified("f.py", &[(8, 5, 8, 5)])]));

        let keys: Vec<(String, u32, String)> = out
            .merged
            .iter()
            .map(|i| (i.finding.file.clone(), i.finding.line, i.finding.rule_id.clone()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("f.py".to_string(), 3, "OLD".to_string()),
                ("f.py".to_string(), 10, "NEW".to_string()),
                ("g.py".to_string(), 10, "G".to_string()),
            ]
        );
        assert_eq!(out.superseded.len(), 1);
        assert_eq!(out.superseded[0].finding.rule_id, "KEEP");
        assert_eq!(out.added.len(), 1);
        assert_eq!(out.added[0].hunk_range, HunkRange { start: 8, end: 12 });
        assert_eq!(out.added[0].base_commit, "base");
        assert_eq!(out.ignored, 1);
    }

    #[test]
    fn deleted_file_findings_are_dropped() {
        let prior = vec![item("gone.py", 1, "R"), item("stay.py", 1, "R")];
        let out = merge(
            &prior,
            &[],
            &scope(vec![FileChange::new("gone.py", ChangeStatus::Deleted)]),
        );
        assert_eq!(out.dropped.len(), 1);
        assert_eq!(out.merged.len(), 1);
        assert_eq!(out.merged[0].finding.file, "stay.py");
    }

    #[test]
    fn renamed_file_findings_move_to_new_path() {
        let mut rename = FileChange::new("new.py", ChangeStatus::Renamed);
        rename.old_path = Some("old.py".to_string());
        rename.push_hunk(2, 1, 2, 1);

        let prior = vec![item("old.py", 1, "A"), item("old.py", 2, "B")];
        let fresh = vec![item("new.py", 2, "B2")];
        let out = merge(&prior, &fresh, &scope(vec![rename]));

        let files: Vec<(&str, &str)> = out
            .merged
            .iter()
            .map(|i| (i.finding.file.as_str(), i.finding.rule_id.as_str()))
            .collect();
        assert_eq!(files, vec![("new.py", "A"), ("new.py", "B2")]);
        assert_eq!(out.repathed, 2);
        assert_eq!(out.superseded.len(), 1);
    }

    #[test]
    fn file_level_findings_are_superseded_when_file_changes() {
        let prior = vec![item("f.py", 0, "FILE")];
        let out = merge(&prior, &[], &scope(vec![modified("f.py", &[(40, 2, 40, 2)])]));
        assert!(out.merged.is_empty());
        assert_eq!(out.superseded.len(), 1);
    }

    #[test]
    fn insertion_above_shifts_carried_findings() {
        // two lines inserted after base line 2
        let change = modified("app.py", &[(2, 0, 3, 2)]);
        let prior = vec![item("app.py", 3, "A"), item("app.py", 8, "B"), item("lib.py", 2, "C")];
        let fresh = vec![item("app.py", 5, "A"), item("app.py", 10, "B")];
        let out = merge(&prior, &fresh, &scope(vec![change]));

        assert_eq!(
            lines(&out),
            vec![("app.py", 5, "A"), ("app.py", 10, "B"), ("lib.py", 2, "C")]
        );
        assert!(out.superseded.is_empty());
        assert_eq!(out.shifted, 2);
        assert_eq!(out.carried, 3);
        assert_eq!(out.ignored, 2);
        assert!(!out.is_noop());
    }

    #[test]
    fn findings_on_deleted_lines_are_superseded() {
        // base lines 7..8 removed; the new side anchors at line 6
        let change = modified("app.py", &[(7, 2, 6, 0)]);
        let prior = vec![item("app.py", 3, "A"), item("app.py", 8, "B"), item("app.py", 12, "C")];
        let out = merge(&prior, &[], &scope(vec![change]));

        assert_eq!(lines(&out), vec![("app.py", 3, "A"), ("app.py", 10, "C")]);
        assert_eq!(out.superseded.len(), 1);
        assert_eq!(out.superseded[0].finding.line, 8);
        assert_eq!(out.shifted, 1);
    }

    #[test]
    fn rewritten_hunk_supersedes_by_base_range() {
        // base 4..6 replaced by new 4..4, then one line inserted after base 20
        let change = modified("f.py", &[(4, 3, 4, 1), (20, 0, 19, 1)]);
        let prior = vec![
            item("f.py", 4, "IN"),
            item("f.py", 6, "IN2"),
            item("f.py", 7, "BELOW"),
            item("f.py", 25, "FAR"),
        ];
        let fresh = vec![item("f.py", 4, "NEW"), item("f.py", 19, "INS")];
        let out = merge(&prior, &fresh, &scope(vec![change]));

        assert_eq!(
            lines(&out),
            vec![
                ("f.py", 4, "NEW"),
                ("f.py", 5, "BELOW"),
                ("f.py", 19, "INS"),
                ("f.py", 24, "FAR"),
            ]
        );
        assert_eq!(out.superseded.len(), 2);
        assert_eq!(out.added.len(), 2);
    }

    #[test]
    fn rename_collisions_are_recorded() {
        let mut rename = FileChange::new("b.py", ChangeStatus::Renamed);
        rename.old_path = Some("a.py".to_string());
        let prior = vec![item("a.py", 1, "R"), item("b.py", 1, "R")];
        let out = merge(&prior, &[], &scope(vec![rename]));
        assert_eq!(out.merged.len(), 1);
        assert_eq!(out.resolutions.len(), 1);
        assert_eq!(out.resolutions[0].candidates, 2);
    }
}
