//! Manifest builder: enumerates repository files, detects languages and
//! hashes contents.
//!
//! The walk honours `.gitignore` (when configured), never descends into
//! `.git`, and applies the include/exclude/size/count filters from
//! [`ManifestConfig`]. Output is always sorted by path.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::ManifestConfig;
use crate::domain::delta::HunkRange;
use crate::domain::error::{ConfigError, EngineError, Result};
use crate::domain::manifest::{FileRecord, Language, Manifest};

/// Builds [`Manifest`]s for one repository root.
#[derive(Debug)]
pub struct ManifestBuilder {
    root: PathBuf,
    include: Option<GlobSet>,
    exclude: GlobSet,
    priority: GlobSet,
    max_file_size: u64,
    max_files: usize,
    respect_gitignore: bool,
    skip_dirs: Vec<String>,
}

fn compile(patterns: &[String]) -> std::result::Result<GlobSet, ConfigError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| ConfigError::Glob {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| ConfigError::Glob {
        pattern: patterns.join(","),
        message: e.to_string(),
    })
}

/// Repository-relative path with forward slashes.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Hex SHA-256 of a file, streamed.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    std::io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

impl ManifestBuilder {
    pub fn new(root: impl Into<PathBuf>, config: &ManifestConfig) -> Result<Self> {
        let include = if config.include.is_empty() {
            None
        } else {
            Some(compile(&config.include)?)
        };
        Ok(Self {
            root: root.into(),
            include,
            exclude: compile(&config.exclude)?,
            priority: compile(&config.priority)?,
            max_file_size: config.max_file_size,
            max_files: config.max_files,
            respect_gitignore: config.respect_gitignore,
            skip_dirs: Vec::new(),
        })
    }

    /// Leave out everything under the repository-relative directory `rel`.
    pub fn skip_dir(mut self, rel: impl Into<String>) -> Self {
        let rel = rel.into().trim_matches('/').to_string();
        if !rel.is_empty() {
            self.skip_dirs.push(rel);
        }
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `rel` passes the include/exclude globs.
    pub fn matches(&self, rel: &str) -> bool {
        if self.exclude.is_match(rel) {
            return false;
        }
        let skipped = self.skip_dirs.iter().any(|dir| {
            rel.strip_prefix(dir.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
        });
        if skipped {
            return false;
        }
        match &self.include {
            Some(include) => include.is_match(rel),
            None => true,
        }
    }

    /// Walk the whole repository.
    pub fn build(&self, commit: Option<String>) -> Result<Manifest> {
        let mut walker = WalkBuilder::new(&self.root);
        walker
            .hidden(false)
            .follow_links(false)
            .git_ignore(self.respect_gitignore)
            .git_exclude(self.respect_gitignore)
            .git_global(self.respect_gitignore)
            .ignore(self.respect_gitignore)
            .parents(self.respect_gitignore)
            .require_git(false)
            .filter_entry(|entry| entry.file_name() != ".git");

        let mut candidates = Vec::new();
        for entry in walker.build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "manifest walk error, entry skipped");
                    continue;
                }
            };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let rel = relative_path(&self.root, entry.path());
            if rel.is_empty() || !self.matches(&rel) {
                continue;
            }
            candidates.push((rel, None));
        }
        self.finish(commit, candidates)
    }

    /// Build a manifest of only `scope` paths, annotated with their hunks.
    ///
    /// Paths that no longer exist or fail the filters are left out.
    pub fn build_scoped(
        &self,
        commit: Option<String>,
        scope: &[(String, Vec<HunkRange>)],
    ) -> Result<Manifest> {
        let candidates = scope
            .iter()
            .filter(|(rel, _)| self.root.join(rel).is_file() && self.matches(rel))
            .map(|(rel, hunks)| (rel.clone(), Some(hunks.clone())))
            .collect();
        self.finish(commit, candidates)
    }

    fn finish(
        &self,
        commit: Option<String>,
        candidates: Vec<(String, Option<Vec<HunkRange>>)>,
    ) -> Result<Manifest> {
        let mut skipped = 0usize;
        let mut records = Vec::with_capacity(candidates.len());

        for (rel, hunks) in candidates {
            let path = self.root.join(&rel);
            let size = std::fs::metadata(&path)?.len();
            if size > self.max_file_size {
                debug!(path = %rel, size, "file exceeds max_file_size");
                skipped += 1;
                continue;
            }
            let content_hash = hash_file(&path)
                .map_err(|e| EngineError::Manifest(format!("failed to hash {rel}: {e}")))?;
            records.push(FileRecord {
                language: Language::detect(Path::new(&rel)),
                path: rel,
                size,
                content_hash,
                hunks,
            });
        }

        if records.len() > self.max_files {
            records.sort_by(|a, b| {
                let pa = !self.priority.is_match(&a.path);
                let pb = !self.priority.is_match(&b.path);
                pa.cmp(&pb).then_with(|| a.path.cmp(&b.path))
            });
            skipped += records.len() - self.max_files;
            records.truncate(self.max_files);
        }
        records.sort_by(|a, b| a.path.cmp(&b.path));
        records.dedup_by(|a, b| a.path == b.path);

        Ok(Manifest {
            commit,
            files: records,
            skipped,
        })
    }
}
