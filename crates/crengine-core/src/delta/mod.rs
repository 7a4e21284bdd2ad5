//! Delta engine: scope a re-review to what changed since a base commit.
//!
//! A delta run walks a fixed state machine,
//! `Idle → DiffComputed → ScopeRestricted → ReAnalyzed → Merged → Done`.
//! The stages themselves live in the pipeline; this module owns the state
//! tracking, the git-backed scope computation and the pure merge.

pub mod diff;
pub mod history;
pub mod merge;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::error::ScopeError;
use crate::git;
use crate::obs;

pub use diff::{parse_diff, ChangeStatus, DiffScope, FileChange, HunkEdit, WHOLE_FILE};
pub use history::DeltaHistory;
pub use merge::{merge, MergeOutcome, MergeResolution};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaState {
    Idle,
    DiffComputed,
    ScopeRestricted,
    ReAnalyzed,
    Merged,
    Done,
}

impl DeltaState {
    fn next(&self) -> Option<DeltaState> {
        match self {
            Self::Idle => Some(Self::DiffComputed),
            Self::DiffComputed => Some(Self::ScopeRestricted),
            Self::ScopeRestricted => Some(Self::ReAnalyzed),
            Self::ReAnalyzed => Some(Self::Merged),
            Self::Merged => Some(Self::Done),
            Self::Done => None,
        }
    }
}

impl fmt::Display for DeltaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::DiffComputed => "diff_computed",
            Self::ScopeRestricted => "scope_restricted",
            Self::ReAnalyzed => "re_analyzed",
            Self::Merged => "merged",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Tracks the state of one delta run.
#[derive(Debug)]
pub struct DeltaRun {
    run_id: String,
    state: DeltaState,
}

impl DeltaRun {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            state: DeltaState::Idle,
        }
    }

    pub fn state(&self) -> DeltaState {
        self.state
    }

    /// Move to `to`; only the single next state is legal.
    pub fn advance(&mut self, to: DeltaState) -> Result<(), ScopeError> {
        if self.state.next() != Some(to) {
            return Err(ScopeError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        obs::emit_delta_transition(&self.run_id, &self.state.to_string(), &to.to_string());
        self.state = to;
        Ok(())
    }
}

/// Compute the per-file changes from `base_ref` to `head_ref`.
///
/// `head_ref = None` compares against the working tree, including untracked
/// files (as whole-file additions). Fails before any analysis when the
/// directory is not a repository or either reference is unknown.
pub fn compute_delta(
    repo: &Path,
    base_ref: &str,
    head_ref: Option<&str>,
) -> Result<DiffScope, ScopeError> {
    if !git::is_git_repo(repo) {
        return Err(ScopeError::NotARepository(repo.to_path_buf()));
    }
    let base_commit = git::resolve_commit(repo, base_ref)?;
    let head_commit = match head_ref {
        Some(head) => git::resolve_commit(repo, head)?,
        None => git::capture_head_sha(repo)?,
    };

    let text = git::diff_text(repo, &base_commit, head_ref.map(|_| head_commit.as_str()))?;
    let mut files = parse_diff(&text)?;

    if head_ref.is_none() {
        for path in git::untracked_files(repo)? {
            if !files.iter().any(|c| c.path == path) {
                let mut change = FileChange::new(path, ChangeStatus::Added);
                change.whole_file = true;
                files.push(change);
            }
        }
        files.sort_by(|a, b| a.path.cmp(&b.path).then(a.old_path.cmp(&b.old_path)));
    }

    Ok(DiffScope {
        base_commit,
        head_commit,
        working_tree: head_ref.is_none(),
        files,
    })
}
