//! Structured observability hooks for review run lifecycle events.
//!
//! This module provides:
//! - Subscriber setup for the binary via `init_tracing`
//! - A run-scoped tracing span via `run_span`
//! - Emission functions for run start/finish, stage completion, adapter
//!   outcomes, delta transitions and artifact writes
//!
//! Events are emitted at `info!` level (degradations at `warn!`); filter them
//! with `CRENGINE_LOG` (or `RUST_LOG`).

use tracing::{debug, info, warn, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "CRENGINE_LOG";

/// Shape of log lines on stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per event, flattened, with the enclosing
    /// `crengine.run` span attached.
    Json,
}

/// `level` for crengine's crates, `warn` for everything else (git, reqwest,
/// hyper).
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    format!("warn,crengine={level},crengine_core={level},crengine_pipeline={level}")
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

/// Install the global subscriber. Stdout stays free for reports.
///
/// Only the first call takes effect.
pub fn init_tracing(format: LogFormat, level: Level) {
    let filter = env_filter(level);
    let layer = fmt::layer().with_writer(std::io::stderr);
    let installed = match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(layer.compact())
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                layer
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init(),
    };
    if let Err(e) = installed {
        debug!(error = %e, "tracing subscriber already installed");
    }
}

/// Run-scoped span tagged with the run id and kind.
///
/// Runs are async, so the span is attached with `tracing::Instrument`
/// rather than entered:
///
/// ```ignore
/// pipeline.full(&run_id).instrument(run_span(&run_id, "full")).await
/// ```
pub fn run_span(run_id: &str, kind: &str) -> tracing::Span {
    tracing::info_span!("crengine.run", run_id = %run_id, kind = %kind)
}

/// Emit event: run started.
pub fn emit_run_started(run_id: &str, kind: &str, repo: &str) {
    info!(event = "run.started", run_id = %run_id, kind = %kind, repo = %repo);
}

/// Emit event: run finished with duration, item count and warning count.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, items: usize, warnings: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        items = items,
        warnings = warnings,
    );
}

/// Emit event: a pipeline stage completed.
pub fn emit_stage_completed(run_id: &str, stage: &str, items: usize) {
    info!(event = "stage.completed", run_id = %run_id, stage = %stage, items = items);
}

/// Emit event: an adapter finished cleanly.
pub fn emit_adapter_finished(tool: &str, findings: usize, malformed: usize, duration_ms: u64) {
    info!(
        event = "adapter.finished",
        tool = %tool,
        findings = findings,
        malformed = malformed,
        duration_ms = duration_ms,
    );
}

/// Emit event: an adapter degraded to zero findings (warning level).
pub fn emit_adapter_degraded(tool: &str, error: &dyn std::fmt::Display) {
    warn!(event = "adapter.degraded", tool = %tool, error = %error);
}

/// Emit event: delta state machine transition.
pub fn emit_delta_transition(run_id: &str, from: &str, to: &str) {
    info!(event = "delta.transition", run_id = %run_id, from = %from, to = %to);
}

/// Emit event: an artifact was written to the staging directory.
pub fn emit_artifact_written(name: &str, bytes: usize, digest: &str) {
    info!(event = "artifact.written", name = %name, bytes = bytes, digest = %digest);
}

/// Emit event: a recoverable problem recorded in the run summary.
pub fn emit_run_warning(run_id: &str, source: &str, message: &str) {
    warn!(event = "run.warning", run_id = %run_id, source = %source, message = %message);
}

/// Emit event: run aborted by a fatal error (warning level).
pub fn emit_run_failed(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.failed", run_id = %run_id, error = %error);
}
