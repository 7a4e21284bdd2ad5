//! crengine Core Library
//!
//! Finding model, configuration, manifest building, normalization, scoring,
//! phase consolidation, delta scoping/merging and run artifacts. The async
//! adapter pipeline that drives these stages lives in `crengine-pipeline`.

pub mod artifacts;
pub mod config;
pub mod consolidate;
pub mod delta;
pub mod domain;
pub mod git;
pub mod manifest;
pub mod normalize;
pub mod obs;
pub mod recommend;
pub mod scoring;

pub use artifacts::{ArtifactStore, RunKind, RunRecord, RunSummary, StagedRun, ToolRunSummary};
pub use config::{
    AiConfig, AiProviderKind, EngineConfig, ManifestConfig, PhaseConfig, PipelineConfig,
    ScoringConfig, ToolConfig,
};
pub use consolidate::{consolidate, PhaseGroup, PhasePlan, PhaseRouter, PlannedItem};
pub use delta::{compute_delta, merge, DeltaRun, DeltaState, DiffScope, MergeOutcome};
pub use domain::{
    ArtifactError, ConfigError, DeltaFinding, EngineError, FileRecord, Finding, FindingKey,
    HunkRange, Language, Manifest, Phase, PhaseRule, Result, ReviewSnapshot, ScopeError,
    ScoredItem, Severity,
};
pub use git::{capture_head_sha, is_git_repo};
pub use manifest::ManifestBuilder;
pub use normalize::{normalize, normalize_scored};
pub use obs::{init_tracing, run_span, LogFormat};
pub use recommend::Recommendation;
pub use scoring::Scorer;

/// crengine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
