//! Parser for `git diff --unified=0` output.

use serde::{Deserialize, Serialize};

use crate::domain::delta::HunkRange;
use crate::domain::error::ScopeError;

/// Hunk covering every line of a file.
pub const WHOLE_FILE: HunkRange = HunkRange {
    start: 1,
    end: u32::MAX,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

/// One `@@ -a,b +c,d @@` header, both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HunkEdit {
    pub old_start: u32,
    pub old_count: u32,
    pub new_start: u32,
    pub new_count: u32,
}

impl HunkEdit {
    /// Last base line this hunk replaces; for pure insertions, the line
    /// the new text follows.
    fn old_last(&self) -> u32 {
        if self.old_count == 0 {
            self.old_start
        } else {
            self.old_start + self.old_count - 1
        }
    }

    fn replaces(&self, old_line: u32) -> bool {
        self.old_count > 0 && self.old_start <= old_line && old_line <= self.old_last()
    }

    fn line_delta(&self) -> i64 {
        i64::from(self.new_count) - i64::from(self.old_count)
    }
}

/// Changes to one file between base and head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// New-side path (old path for deletions).
    pub path: String,

    /// Pre-rename path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,

    pub status: ChangeStatus,

    /// New-side changed line ranges.
    pub hunks: Vec<HunkRange>,

    /// Raw hunk headers in base order, used to map base lines forward.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edits: Vec<HunkEdit>,

    /// Treat every line as changed (added, binary or content-less change).
    #[serde(default)]
    pub whole_file: bool,
}

impl FileChange {
    pub fn new(path: impl Into<String>, status: ChangeStatus) -> Self {
        Self {
            path: path.into(),
            old_path: None,
            status,
            hunks: Vec::new(),
            edits: Vec::new(),
            whole_file: false,
        }
    }

    /// Record one hunk header.
    pub fn push_hunk(&mut self, old_start: u32, old_count: u32, new_start: u32, new_count: u32) {
        self.edits.push(HunkEdit {
            old_start,
            old_count,
            new_start,
            new_count,
        });
        self.hunks.push(HunkRange::from_start_count(new_start, new_count));
    }

    /// Whether a finding at `line` on the new side falls in a changed region.
    ///
    /// File-level findings (`line == 0`) count as changed whenever the file
    /// has any change to re-analyze.
    pub fn covers(&self, line: u32) -> bool {
        if self.whole_file {
            return true;
        }
        if line == 0 {
            return !self.hunks.is_empty();
        }
        self.hunks.iter().any(|h| h.contains(line))
    }

    /// Whether a base-side `line` was rewritten or deleted by this change.
    ///
    /// Pure insertions replace nothing on the base side.
    pub fn replaces_base(&self, line: u32) -> bool {
        if self.whole_file {
            return true;
        }
        if line == 0 {
            return !self.hunks.is_empty();
        }
        self.edits.iter().any(|e| e.replaces(line))
    }

    /// New-side position of an untouched base `line`.
    pub fn map_base_line(&self, line: u32) -> u32 {
        if line == 0 || self.whole_file {
            return line;
        }
        let shift: i64 = self
            .edits
            .iter()
            .filter(|e| e.old_last() < line)
            .map(HunkEdit::line_delta)
            .sum();
        u32::try_from((i64::from(line) + shift).max(1)).unwrap_or(u32::MAX)
    }

    /// Ranges to re-analyze; empty for deletions and pure renames.
    pub fn scan_ranges(&self) -> Vec<HunkRange> {
        match (self.status, self.whole_file) {
            (ChangeStatus::Deleted, _) => Vec::new(),
            (_, true) => vec![WHOLE_FILE],
            _ => self.hunks.clone(),
        }
    }
}

/// Per-file changes between two commits (or a commit and the working tree).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffScope {
    pub base_commit: String,

    /// Head commit, or the HEAD commit when diffing the working tree.
    pub head_commit: String,

    /// Whether head is the working tree rather than `head_commit` itself.
    #[serde(default)]
    pub working_tree: bool,

    /// Changes sorted by path.
    pub files: Vec<FileChange>,
}

impl DiffScope {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Change for a new-side path.
    pub fn get(&self, path: &str) -> Option<&FileChange> {
        self.files
            .iter()
            .find(|c| c.path == path && c.status != ChangeStatus::Deleted)
    }

    pub fn is_deleted(&self, path: &str) -> bool {
        self.files
            .iter()
            .any(|c| c.status == ChangeStatus::Deleted && c.path == path)
    }

    /// New path of a file renamed away from `old`.
    pub fn renamed_to(&self, old: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|c| c.status == ChangeStatus::Renamed && c.old_path.as_deref() == Some(old))
            .map(|c| c.path.as_str())
    }

    /// Keep only changes whose new or pre-rename path passes `keep`.
    pub fn retain_paths(&mut self, keep: impl Fn(&str) -> bool) {
        self.files
            .retain(|c| keep(&c.path) || c.old_path.as_deref().is_some_and(&keep));
    }

    /// `(path, ranges)` pairs a scoped manifest should cover.
    pub fn scan_entries(&self) -> Vec<(String, Vec<HunkRange>)> {
        self.files
            .iter()
            .map(|c| (c.path.clone(), c.scan_ranges()))
            .filter(|(_, ranges)| !ranges.is_empty())
            .collect()
    }
}

fn unquote(raw: &str) -> String {
    let raw = raw.trim_end_matches(['\t', '\r']);
    let Some(inner) = raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')) else {
        return raw.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn strip_side(raw: &str, prefix: &str) -> Option<String> {
    let path = unquote(raw);
    if path == "/dev/null" {
        return None;
    }
    Some(path.strip_prefix(prefix).unwrap_or(&path).to_string())
}

fn parse_range(token: &str) -> Result<(u32, u32), ScopeError> {
    let malformed = || ScopeError::MalformedDiff(format!("bad hunk range: {token}"));
    let (start, count) = match token.split_once(',') {
        Some((s, c)) => (s, c.parse::<u32>().map_err(|_| malformed())?),
        None => (token, 1),
    };
    Ok((start.parse::<u32>().map_err(|_| malformed())?, count))
}

/// Parse `@@ -a[,b] +c[,d] @@` into `(old_start, old_count, new_start, new_count)`.
fn parse_hunk_header(line: &str) -> Result<(u32, u32, u32, u32), ScopeError> {
    let mut parts = line.split_whitespace();
    let (_, old, new) = (parts.next(), parts.next(), parts.next());
    let old = old
        .and_then(|t| t.strip_prefix('-'))
        .ok_or_else(|| ScopeError::MalformedDiff(line.to_string()))?;
    let new = new
        .and_then(|t| t.strip_prefix('+'))
        .ok_or_else(|| ScopeError::MalformedDiff(line.to_string()))?;
    let (old_start, old_count) = parse_range(old)?;
    let (new_start, new_count) = parse_range(new)?;
    Ok((old_start, old_count, new_start, new_count))
}

/// Path pair from a `diff --git a/X b/Y` header, used when no `---`/`+++`
/// lines follow (binary and mode-only changes).
fn header_path(rest: &str) -> String {
    let rest = rest.trim();
    if rest.starts_with('"') {
        if let Some(end) = rest[1..].find("\" ").map(|i| i + 1) {
            let new = rest[end + 1..].trim();
            return strip_side(new, "b/").unwrap_or_default();
        }
    }
    match rest.rfind(" b/") {
        Some(idx) => rest[idx + 3..].to_string(),
        None => rest.to_string(),
    }
}

/// Parse unified diff text into per-file changes, sorted by path.
pub fn parse_diff(text: &str) -> Result<Vec<FileChange>, ScopeError> {
    let mut files: Vec<FileChange> = Vec::new();
    let mut current: Option<FileChange> = None;
    let mut old_left = 0u32;
    let mut new_left = 0u32;

    for line in text.lines() {
        if old_left > 0 || new_left > 0 {
            match line.as_bytes().first() {
                Some(b'-') => old_left = old_left.saturating_sub(1),
                Some(b'+') => new_left = new_left.saturating_sub(1),
                Some(b' ') => {
                    old_left = old_left.saturating_sub(1);
                    new_left = new_left.saturating_sub(1);
                }
                Some(b'\\') => {}
                _ => {
                    return Err(ScopeError::MalformedDiff(format!(
                        "unexpected line inside hunk: {line}"
                    )))
                }
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix("diff --git ") {
            files.extend(current.take());
            current = Some(FileChange::new(header_path(rest), ChangeStatus::Modified));
            continue;
        }
        let Some(change) = current.as_mut() else {
            continue;
        };

        if line.starts_with("new file mode") {
            change.status = ChangeStatus::Added;
        } else if line.starts_with("deleted file mode") {
            change.status = ChangeStatus::Deleted;
        } else if let Some(from) = line.strip_prefix("rename from ") {
            change.status = ChangeStatus::Renamed;
            change.old_path = Some(unquote(from));
        } else if let Some(to) = line.strip_prefix("rename to ") {
            change.path = unquote(to);
        } else if let Some(old) = line.strip_prefix("--- ") {
            if change.status == ChangeStatus::Deleted {
                if let Some(path) = strip_side(old, "a/") {
                    change.path = path;
                }
            }
        } else if let Some(new) = line.strip_prefix("+++ ") {
            if let Some(path) = strip_side(new, "b/") {
                change.path = path;
            }
        } else if line.starts_with("Binary files ") || line.starts_with("GIT binary patch") {
            change.whole_file = true;
        } else if line.starts_with("@@ ") {
            let (old_start, old_count, new_start, new_count) = parse_hunk_header(line)?;
            if change.status != ChangeStatus::Deleted {
                change.push_hunk(old_start, old_count, new_start, new_count);
            }
            old_left = old_count;
            new_left = new_count;
        }
    }
    files.extend(current.take());

    for change in &mut files {
        match change.status {
            ChangeStatus::Added => change.whole_file = true,
            ChangeStatus::Deleted => {
                change.hunks.clear();
                change.edits.clear();
                change.whole_file = false;
            }
            _ => {}
        }
        change.hunks.sort();
        change.hunks.dedup();
        change.edits.sort();
    }
    files.sort_by(|a, b| a.path.cmp(&b.path).then(a.old_path.cmp(&b.old_path)));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODIFIED: &str = "\
diff --git a/src/app.py b/src/app.py
index 83db48f..bf269f4 100644
--- a/src/app.py
+++ b/src/app.py
@@ -3 +3 @@ def main():
-    x = 1
+    x = 2
@@ -10,0 +11,2 @@ def main():
+    y = 3
+    z = 4
@@ -20,2 +22,0 @@ def other():
--- a/src/app.py
-    pass
";

    #[test]
    fn parses_modified_file_hunks() {
        let files = parse_diff(MODIFIED).unwrap();
        assert_eq!(files.len(), 1);
        let change = &files[0];
        assert_eq!(change.path, "src/app.py");
        assert_eq!(change.status, ChangeStatus::Modified);
        assert_eq!(
            change.hunks,
            vec![
                HunkRange { start: 3, end: 3 },
                HunkRange { start: 11, end: 12 },
                HunkRange { start: 22, end: 22 },
            ]
        );
        assert!(!change.whole_file);
        assert!(change.covers(12));
        assert!(!change.covers(13));
        assert!(change.covers(0));
        assert_eq!(change.edits.len(), 3);
        assert_eq!(
            change.edits[1],
            HunkEdit {
                old_start: 10,
                old_count: 0,
                new_start: 11,
                new_count: 2
            }
        );
    }

    #[test]
    fn base_lines_map_through_asymmetric_hunks() {
        let change = &parse_diff(MODIFIED).unwrap()[0];
        // line 3 was rewritten, 20..21 deleted, nothing on the base side for the insertion
        assert!(change.replaces_base(3));
        assert!(!change.replaces_base(10));
        assert!(!change.replaces_base(11));
        assert!(change.replaces_base(20));
        assert!(change.replaces_base(21));
        assert!(!change.replaces_base(22));

        assert_eq!(change.map_base_line(2), 2);
        assert_eq!(change.map_base_line(10), 10);
        assert_eq!(change.map_base_line(11), 13);
        assert_eq!(change.map_base_line(19), 21);
        assert_eq!(change.map_base_line(22), 22);
        assert_eq!(change.map_base_line(0), 0);
    }

    #[test]
    fn parses_added_deleted_and_renamed() {
        let text = "\
diff --git a/new.py b/new.py
new file mode 100644
index 0000000..e69de29
--- /dev/null
+++ b/new.py
@@ -0,0 +1,2 @@
+a
+b
diff --git a/old.py b/old.py
deleted file mode 100644
index e69de29..0000000
--- a/old.py
+++ /dev/null
@@ -1,3 +0,0 @@
-a
-b
-c
diff --git a/pkg/one.py b/pkg/two.py
similarity index 90%
rename from pkg/one.py
rename to pkg/two.py
index 1111111..2222222 100644
--- a/pkg/one.py
+++ b/pkg/two.py
@@ -5 +5 @@
-x
+y
";
        let files = parse_diff(text).unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["new.py", "old.py", "pkg/two.py"]);

        assert_eq!(files[0].status, ChangeStatus::Added);
        assert!(files[0].whole_file);

        assert_eq!(files[1].status, ChangeStatus::Deleted);
        assert!(files[1].hunks.is_empty());
        assert!(files[1].scan_ranges().is_empty());

        assert_eq!(files[2].status, ChangeStatus::Renamed);
        assert_eq!(files[2].old_path.as_deref(), Some("pkg/one.py"));
        assert_eq!(files[2].hunks, vec![HunkRange { start: 5, end: 5 }]);
    }

    #[test]
    fn pure_rename_and_binary_changes() {
        let text = "\
diff --git a/a.txt b/b.txt
similarity index 100%
rename from a.txt
rename to b.txt
diff --git a/logo.png b/logo.png
index 1111111..2222222 100644
Binary files a/logo.png and b/logo.png differ
";
        let files = parse_diff(text).unwrap();
        assert_eq!(files[0].path, "b.txt");
        assert!(files[0].hunks.is_empty());
        assert!(files[0].scan_ranges().is_empty());
        assert!(!files[0].covers(0));

        assert_eq!(files[1].path, "logo.png");
        assert!(files[1].whole_file);
        assert_eq!(files[1].scan_ranges(), vec![WHOLE_FILE]);
    }

    #[test]
    fn quoted_paths_are_unquoted() {
        let text = "\
diff --git \"a/with space.py\" \"b/with space.py\"
--- \"a/with space.py\"
+++ \"b/with space.py\"
@@ -1 +1 @@
-a
+b
";
        let files = parse_diff(text).unwrap();
        assert_eq!(files[0].path, "with space.py");
    }

    #[test]
    fn pure_deletion_hunk_anchors_at_start() {
        let text = "\
diff --git a/x.py b/x.py
--- a/x.py
+++ b/x.py
@@ -1,2 +0,0 @@
-a
-b
";
        let files = parse_diff(text).unwrap();
        assert_eq!(files[0].hunks, vec![HunkRange { start: 1, end: 1 }]);
        assert!(files[0].replaces_base(2));
        assert!(!files[0].replaces_base(3));
        assert_eq!(files[0].map_base_line(3), 1);
    }

    #[test]
    fn malformed_hunk_header_is_an_error() {
        let text = "diff --git a/x b/x\n--- a/x\n+++ b/x\n@@ -a +b @@\n";
        assert!(matches!(parse_diff(text), Err(ScopeError::MalformedDiff(_))));
    }

    #[test]
    fn empty_diff_has_no_files() {
        assert!(parse_diff("").unwrap().is_empty());
    }

    #[test]
    fn scope_lookup_helpers() {
        let mut renamed = FileChange::new("new/a.py", ChangeStatus::Renamed);
        renamed.old_path = Some("old/a.py".to_string());
        let scope = DiffScope {
            base_commit: "b".to_string(),
            head_commit: "h".to_string(),
            working_tree: false,
            files: vec![FileChange::new("gone.py", ChangeStatus::Deleted), renamed],
        };
        assert!(scope.is_deleted("gone.py"));
        assert!(scope.get("gone.py").is_none());
        assert_eq!(scope.renamed_to("old/a.py"), Some("new/a.py"));
        assert!(scope.scan_entries().is_empty());

        let mut scope = scope;
        scope.retain_paths(|p| p.starts_with("old/"));
        assert_eq!(scope.files.len(), 1);
        assert_eq!(scope.files[0].path, "new/a.py");
    }
}
