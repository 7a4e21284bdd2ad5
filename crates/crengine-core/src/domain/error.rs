//! Error taxonomy for crengine.
//!
//! Fatal kinds (`ConfigError`, `ScopeError`, `ArtifactError`) abort a run
//! before any artifact is promoted. Recoverable adapter and AI failures live
//! in `crengine-pipeline` and are folded into the run summary as warnings.

use std::path::PathBuf;

/// Invalid or unreadable configuration. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{dimension} weights must sum to 1.0, got {sum}")]
    WeightSum { dimension: String, sum: f64 },

    #[error("{dimension} weights must not be empty")]
    EmptyWeights { dimension: String },

    #[error("{dimension} weight for {signal} is negative or not finite: {weight}")]
    InvalidWeight {
        dimension: String,
        signal: String,
        weight: f64,
    },

    #[error("unknown scoring signal in {dimension} weights: {signal}")]
    UnknownSignal { dimension: String, signal: String },

    #[error("invalid hours table: {0}")]
    HoursTable(String),

    #[error("invalid phase rule: {0}")]
    PhaseRule(String),

    #[error("tag {tag} is mapped to both {first} and {second}")]
    ConflictingTag {
        tag: String,
        first: String,
        second: String,
    },

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("unknown AI provider: {0}")]
    UnknownProvider(String),

    #[error("invalid glob {pattern}: {message}")]
    Glob { pattern: String, message: String },

    #[error("invalid limit {field}: {message}")]
    Limit { field: String, message: String },
}

/// Failure to compute the scope of a delta run. Fatal to that run only.
#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error("not a git repository: {0}")]
    NotARepository(PathBuf),

    #[error("reference not found in history: {0}")]
    RefNotFound(String),

    #[error("no base reference: pass one explicitly or complete a full run first")]
    NoBase,

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("malformed diff: {0}")]
    MalformedDiff(String),

    #[error("invalid delta transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reading or writing run artifacts.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact not found: {0}")]
    NotFound(PathBuf),

    #[error("digest mismatch for {name}: expected {expected}, got {actual}")]
    DigestMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level engine error.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("scope error: {0}")]
    Scope(#[from] ScopeError),

    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
