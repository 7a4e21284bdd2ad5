//! Git integration: repository state and diffs for delta runs.
//!
//! Every call runs the `git` binary with an explicit argument vector in the
//! repository directory.

use std::path::Path;
use std::process::Command;

use crate::domain::error::ScopeError;

/// Rename similarity threshold passed to `git diff`.
pub const RENAME_THRESHOLD: &str = "50%";

fn git(repo_dir: &Path, args: &[&str]) -> Result<std::process::Output, ScopeError> {
    Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .map_err(|e| ScopeError::Git {
            command: args.join(" "),
            stderr: format!("failed to run git: {e}"),
        })
}

fn git_stdout(repo_dir: &Path, args: &[&str]) -> Result<String, ScopeError> {
    let output = git(repo_dir, args)?;
    if !output.status.success() {
        return Err(ScopeError::Git {
            command: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Capture the HEAD commit SHA from a git repository.
pub fn capture_head_sha(repo_dir: &Path) -> Result<String, ScopeError> {
    let sha = git_stdout(repo_dir, &["rev-parse", "HEAD"])?.trim().to_string();
    if sha.is_empty() {
        return Err(ScopeError::Git {
            command: "rev-parse HEAD".to_string(),
            stderr: "empty output".to_string(),
        });
    }
    Ok(sha)
}

/// Check whether a directory is inside a git work tree.
pub fn is_git_repo(dir: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Resolve `rev` to a full commit SHA.
///
/// Fails with [`ScopeError::RefNotFound`] when `rev` does not name a commit
/// in this repository's history.
pub fn resolve_commit(repo_dir: &Path, rev: &str) -> Result<String, ScopeError> {
    if rev.trim().is_empty() || rev.starts_with('-') {
        return Err(ScopeError::RefNotFound(rev.to_string()));
    }
    let spec = format!("{rev}^{{commit}}");
    let output = git(repo_dir, &["rev-parse", "--verify", "--quiet", &spec])?;
    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !output.status.success() || sha.is_empty() {
        return Err(ScopeError::RefNotFound(rev.to_string()));
    }
    Ok(sha)
}

/// Zero-context unified diff from `base` to `head`.
///
/// `head = None` diffs against the working tree (tracked files only; see
/// [`untracked_files`]). Paths are relative to `repo_dir` and changes outside
/// it are omitted, so a subdirectory of a work tree can be reviewed on its own.
pub fn diff_text(repo_dir: &Path, base: &str, head: Option<&str>) -> Result<String, ScopeError> {
    let renames = format!("--find-renames={RENAME_THRESHOLD}");
    let mut args = vec![
        "-c",
        "core.quotepath=false",
        "diff",
        "--relative",
        "--unified=0",
        renames.as_str(),
        "--no-color",
        "--no-ext-diff",
        "--src-prefix=a/",
        "--dst-prefix=b/",
        base,
    ];
    if let Some(head) = head {
        args.push(head);
    }
    args.push("--");
    git_stdout(repo_dir, &args)
}

/// Untracked, non-ignored files under `repo_dir`, relative to it.
pub fn untracked_files(repo_dir: &Path) -> Result<Vec<String>, ScopeError> {
    let out = git_stdout(
        repo_dir,
        &["ls-files", "--others", "--exclude-standard", "-z"],
    )?;
    Ok(out
        .split('\0')
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect())
}
