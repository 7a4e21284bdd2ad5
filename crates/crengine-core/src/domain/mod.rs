//! Domain models for crengine.
//!
//! Canonical definitions shared by every stage:
//! - `Finding`: one issue reported by an analysis tool
//! - `Manifest`: the enumerated, hashed file set a run analyzes
//! - `ScoredItem`: a finding with difficulty/value scores
//! - `Phase`: the five improvement-plan buckets
//! - `DeltaFinding` / `ReviewSnapshot`: incremental re-review records

pub mod delta;
pub mod digest;
pub mod error;
pub mod finding;
pub mod manifest;
pub mod phase;
pub mod scored;

pub use delta::{DeltaFinding, HunkRange, ReviewSnapshot};
pub use error::{ArtifactError, ConfigError, EngineError, Result, ScopeError};
pub use finding::{Finding, FindingKey, Severity};
pub use manifest::{FileRecord, Language, Manifest};
pub use phase::{Phase, PhaseRule};
pub use scored::ScoredItem;
