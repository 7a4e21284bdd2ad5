//! crengine Pipeline
//!
//! Runs external analyzers as bounded async subprocesses and drives the
//! core stages (normalize, score, consolidate, delta merge) over their
//! output:
//! - `adapters`: the `Analyzer` trait, builtin tools and the registry
//! - `pool`: `JoinSet` + `Semaphore` execution with a run-level deadline
//! - `pipeline`: full and delta runs, artifact staging
//! - `ai`: optional patch drafting after consolidation

pub mod adapters;
pub mod ai;
pub mod error;
pub mod pipeline;
pub mod pool;
pub mod runner;

pub use adapters::registry::AnalyzerRegistry;
pub use adapters::{AdapterOutput, Analyzer, ToolAdapter, ToolSpec};
pub use ai::{AiDrafts, FindingContext, OpenAiDrafter, PatchDrafter};
pub use error::{AdapterError, AiProviderError};
pub use pipeline::{DeltaReport, ReviewPipeline, RunReport};
pub use pool::{AnalyzerJob, AnalyzerRun, WorkerPool};
pub use runner::{ToolOutput, ToolRunner};
