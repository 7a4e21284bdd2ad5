//! Finding normalizer.
//!
//! Merges adapter outputs into one ordered, deduplicated set. The result
//! depends only on the input multiset, never on its order, so concurrent
//! adapters completing in any order produce identical output.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::finding::{Finding, FindingKey};
use crate::domain::scored::ScoredItem;

/// Records the normalizer can collapse: anything wrapping a [`Finding`].
pub trait Normalizable: AsRef<Finding> + AsMut<Finding> + Clone {
    /// Final tie-break between duplicates whose findings are equally rich.
    fn tiebreak(&self, _other: &Self) -> Ordering {
        Ordering::Equal
    }
}

impl Normalizable for Finding {}

impl Normalizable for ScoredItem {
    fn tiebreak(&self, other: &Self) -> Ordering {
        self.value
            .cmp(&other.value)
            .then(self.difficulty.cmp(&other.difficulty))
            .then(self.estimated_hours.total_cmp(&other.estimated_hours))
    }
}

/// Make `file` repository-relative with forward slashes.
///
/// Absolute paths under `root` lose the root prefix; a leading `./` is
/// dropped. Paths outside `root` are kept as given (with `/` separators).
pub fn relativize(root: Option<&Path>, file: &str) -> String {
    let mut path = file.replace('\\', "/");
    if let Some(root) = root {
        let root = root.to_string_lossy().replace('\\', "/");
        let root = root.trim_end_matches('/');
        if !root.is_empty() {
            if let Some(rest) = path.strip_prefix(root) {
                if rest.starts_with('/') {
                    path = rest.trim_start_matches('/').to_string();
                }
            }
        }
    }
    while let Some(rest) = path.strip_prefix("./") {
        path = rest.to_string();
    }
    path
}

fn clean(finding: &mut Finding, root: Option<&Path>) {
    finding.file = relativize(root, &finding.file);
    let tags = std::mem::take(&mut finding.tags);
    finding.tags = tags
        .into_iter()
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
}

fn richer<T: Normalizable>(a: &T, b: &T) -> Ordering {
    a.as_ref()
        .richness(b.as_ref())
        .then_with(|| a.tiebreak(b))
}

/// Collapse exact-identity duplicates and sort into report order.
///
/// The survivor of each identity is the richest record; tags of every
/// collapsed duplicate are unioned into it.
pub fn collapse<T: Normalizable>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut groups: BTreeMap<FindingKey, T> = BTreeMap::new();
    for item in items {
        let key = item.as_ref().key();
        match groups.remove(&key) {
            None => {
                groups.insert(key, item);
            }
            Some(existing) => {
                let (mut survivor, other) = if richer(&item, &existing) == Ordering::Greater {
                    (item, existing)
                } else {
                    (existing, item)
                };
                let extra = other.as_ref().tags.clone();
                survivor.as_mut().tags.extend(extra);
                groups.insert(key, survivor);
            }
        }
    }
    let mut out: Vec<T> = groups.into_values().collect();
    out.sort_by(|a, b| a.as_ref().report_order(b.as_ref()));
    out
}

/// Normalize raw adapter findings: clean paths and tags, then collapse.
pub fn normalize(findings: impl IntoIterator<Item = Finding>, root: Option<&Path>) -> Vec<Finding> {
    collapse(findings.into_iter().map(|mut f| {
        clean(&mut f, root);
        f
    }))
}

/// Collapse a scored sequence the same way findings are collapsed.
pub fn normalize_scored(items: impl IntoIterator<Item = ScoredItem>) -> Vec<ScoredItem> {
    collapse(items.into_iter().map(|mut item| {
        clean(&mut item.finding, None);
        item
    }))
}
