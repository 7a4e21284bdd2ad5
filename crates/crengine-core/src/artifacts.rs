//! Run artifact persistence.
//!
//! Each run writes its stage outputs to `<out>/<timestamp>-<commit12>/`:
//!
//! | file | content |
//! |---|---|
//! | `000_manifest.json` | [`Manifest`](crate::domain::Manifest) |
//! | `010_findings.json` | normalized findings |
//! | `030_scored.json` | [`ReviewSnapshot`] (the prior of the next delta run) |
//! | `050_phases.json` | phase plan |
//! | `060_ai_patches.json` | drafted patches, when the AI stage ran |
//! | `070_delta.json` | delta report, delta runs only |
//! | `run.json` | [`RunRecord`] with the SHA-256 of every file above |
//!
//! Files are written into a hidden staging directory and the directory is
//! renamed into place only by [`StagedRun::commit`], after which `LATEST` is
//! updated. A run that fails before commit leaves nothing behind. Delta runs
//! commit with [`StagedRun::commit_with_history`], which persists the delta
//! history before `LATEST` moves, so `LATEST` never names a run whose history
//! entry is missing.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::{NamedTempFile, TempDir};

use crate::delta::DeltaHistory;
use crate::domain::delta::ReviewSnapshot;
use crate::domain::digest::sha256_hex;
use crate::domain::error::ArtifactError;
use crate::obs;

pub const MANIFEST_FILE: &str = "000_manifest.json";
pub const FINDINGS_FILE: &str = "010_findings.json";
pub const SCORED_FILE: &str = "030_scored.json";
pub const PHASES_FILE: &str = "050_phases.json";
pub const AI_PATCHES_FILE: &str = "060_ai_patches.json";
pub const DELTA_FILE: &str = "070_delta.json";
pub const RUN_FILE: &str = "run.json";
pub const LATEST_FILE: &str = "LATEST";
pub const HISTORY_FILE: &str = "delta_history.json";

type Result<T> = std::result::Result<T, ArtifactError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Full,
    Delta,
}

/// Outcome of one analyzer during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRunSummary {
    pub tool: String,

    /// `ok`, `skipped`, or the failure kind (`timeout`, `not_installed`, ...).
    pub status: String,
    pub findings: usize,
    pub malformed_records: usize,
}

/// Counts and recoverable problems of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub files: usize,
    pub skipped_files: usize,
    pub findings: usize,
    pub items: usize,

    /// Items per phase slug.
    pub phase_counts: BTreeMap<String, usize>,
    pub estimated_hours: f64,
    pub tools: Vec<ToolRunSummary>,

    /// Recoverable errors (adapter failures, AI provider failures).
    pub warnings: Vec<String>,
}

/// The `run.json` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub kind: RunKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_commit: Option<String>,
    pub config_digest: String,
    pub summary: RunSummary,

    /// Artifact file name → hex SHA-256 of its bytes.
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
}

/// Serialize `value` the way every artifact is written: pretty JSON plus a
/// trailing newline.
pub fn to_artifact_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(dir.join(name)).map_err(|e| e.error)?;
    Ok(())
}

/// Directory name for a run: `<timestamp>-<commit12>`.
pub fn run_dir_name(started_at: DateTime<Utc>, commit: Option<&str>) -> String {
    let short = commit
        .map(|c| c.chars().take(12).collect::<String>())
        .unwrap_or_else(|| "nocommit".to_string());
    format!("{}-{}", started_at.format("%Y%m%dT%H%M%SZ"), short)
}

/// Root of all run directories.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start staging a run.
    pub fn begin(&self, started_at: DateTime<Utc>, commit: Option<&str>) -> Result<StagedRun> {
        std::fs::create_dir_all(&self.root)?;
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.root)?;
        Ok(StagedRun {
            root: self.root.clone(),
            name: run_dir_name(started_at, commit),
            dir: staging,
            digests: BTreeMap::new(),
        })
    }

    /// Directory of the newest committed run, if any.
    pub fn latest_dir(&self) -> Result<Option<PathBuf>> {
        let pointer = self.root.join(LATEST_FILE);
        let name = match std::fs::read_to_string(&pointer) {
            Ok(name) => name,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let dir = self.root.join(name.trim());
        if !dir.is_dir() {
            return Err(ArtifactError::NotFound(dir));
        }
        Ok(Some(dir))
    }

    /// Read `run.json` from a run directory.
    pub fn read_record(&self, run_dir: &Path) -> Result<RunRecord> {
        read_json(&run_dir.join(RUN_FILE))
    }

    /// Read and digest-verify one artifact of a committed run.
    pub fn read_verified<T: DeserializeOwned>(&self, run_dir: &Path, name: &str) -> Result<T> {
        let record = self.read_record(run_dir)?;
        let path = run_dir.join(name);
        let bytes = std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ArtifactError::NotFound(path.clone()),
            _ => e.into(),
        })?;
        let actual = sha256_hex(&bytes);
        match record.artifacts.get(name) {
            Some(expected) if *expected == actual => {}
            Some(expected) => {
                return Err(ArtifactError::DigestMismatch {
                    name: name.to_string(),
                    expected: expected.clone(),
                    actual,
                })
            }
            None => return Err(ArtifactError::NotFound(path)),
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Scored snapshot of the newest committed run.
    pub fn load_latest_snapshot(&self) -> Result<Option<ReviewSnapshot>> {
        match self.latest_dir()? {
            Some(dir) => Ok(Some(self.read_verified(&dir, SCORED_FILE)?)),
            None => Ok(None),
        }
    }

    /// Delta history; empty when none has been written yet.
    pub fn load_history(&self) -> Result<DeltaHistory> {
        let path = self.root.join(HISTORY_FILE);
        if !path.exists() {
            return Ok(DeltaHistory::default());
        }
        read_json(&path)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ArtifactError::NotFound(path.to_path_buf()),
        _ => e.into(),
    })?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// A run being written. Dropping it without [`commit`](Self::commit)
/// discards everything staged.
#[derive(Debug)]
pub struct StagedRun {
    root: PathBuf,
    name: String,
    dir: TempDir,
    digests: BTreeMap<String, String>,
}

impl StagedRun {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write one artifact and record its digest. Returns the digest.
    pub fn write_json<T: Serialize>(&mut self, name: &str, value: &T) -> Result<String> {
        let bytes = to_artifact_bytes(value)?;
        let digest = sha256_hex(&bytes);
        std::fs::write(self.dir.path().join(name), &bytes)?;
        obs::emit_artifact_written(name, bytes.len(), &digest);
        self.digests.insert(name.to_string(), digest.clone());
        Ok(digest)
    }

    /// Write `run.json`, move the directory into place and point `LATEST`
    /// at it. Returns the final directory.
    pub fn commit(self, record: RunRecord) -> Result<PathBuf> {
        self.promote(record, None)
    }

    /// Like [`commit`](Self::commit), but saves `history` between the rename
    /// and the `LATEST` update. If the history write fails, `LATEST` keeps
    /// pointing at the previous run.
    pub fn commit_with_history(self, record: RunRecord, history: &DeltaHistory) -> Result<PathBuf> {
        self.promote(record, Some(history))
    }

    fn promote(mut self, mut record: RunRecord, history: Option<&DeltaHistory>) -> Result<PathBuf> {
        record.artifacts = std::mem::take(&mut self.digests);
        std::fs::write(
            self.dir.path().join(RUN_FILE),
            to_artifact_bytes(&record)?,
        )?;

        let mut name = self.name.clone();
        let mut suffix = 1;
        while self.root.join(&name).exists() {
            suffix += 1;
            name = format!("{}-{suffix}", self.name);
        }
        let final_dir = self.root.join(&name);
        std::fs::rename(self.dir.path(), &final_dir)?;
        if let Some(history) = history {
            write_atomic(&self.root, HISTORY_FILE, &to_artifact_bytes(history)?)?;
        }
        write_atomic(&self.root, LATEST_FILE, format!("{name}\n").as_bytes())?;
        Ok(final_dir)
    }
}
