//! Manifest records: the enumerated, hashed file set a run analyzes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::delta::HunkRange;

/// Source language detected from a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Python,
    Javascript,
    Typescript,
    CSharp,
    Java,
    Go,
    Rust,
    Cpp,
    C,
    Ruby,
    Php,
    Kotlin,
    Swift,
    Shell,
}

impl Language {
    /// Detect the language of `path` from its extension (case-insensitive).
    pub fn detect(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let lang = match ext.as_str() {
            "py" | "pyi" => Self::Python,
            "js" | "jsx" | "mjs" | "cjs" => Self::Javascript,
            "ts" | "tsx" | "mts" | "cts" => Self::Typescript,
            "cs" => Self::CSharp,
            "java" => Self::Java,
            "go" => Self::Go,
            "rs" => Self::Rust,
            "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => Self::Cpp,
            "c" | "h" => Self::C,
            "rb" => Self::Ruby,
            "php" => Self::Php,
            "kt" | "kts" => Self::Kotlin,
            "swift" => Self::Swift,
            "sh" | "bash" => Self::Shell,
            _ => return None,
        };
        Some(lang)
    }
}

/// One file considered by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Repository-relative path with forward slashes.
    pub path: String,

    /// Detected language, if recognised.
    pub language: Option<Language>,

    /// Size in bytes.
    pub size: u64,

    /// Hex SHA-256 of the file contents.
    pub content_hash: String,

    /// Changed line ranges, present only in delta-scoped manifests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hunks: Option<Vec<HunkRange>>,
}

/// Ordered (by path), immutable list of file records built for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// HEAD commit the manifest was built at, when under version control.
    pub commit: Option<String>,

    /// File records sorted by path.
    pub files: Vec<FileRecord>,

    /// Files rejected by size limit or `max_files` truncation.
    #[serde(default)]
    pub skipped: usize,
}

impl Manifest {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.files
            .binary_search_by(|r| r.path.as_str().cmp(path))
            .ok()
            .map(|idx| &self.files[idx])
    }

    /// Total bytes across all records.
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|r| r.size).sum()
    }
}
