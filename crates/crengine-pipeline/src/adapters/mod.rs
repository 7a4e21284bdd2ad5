//! Analyzer adapters.
//!
//! An [`Analyzer`] wraps one external tool and turns its output into
//! canonical [`Finding`]s. The builtin tools are all subprocess-backed and
//! share one implementation, [`ToolAdapter`], parameterised by a static
//! [`ToolSpec`] (binary, arguments, accepted exit codes, parser).

pub mod bandit;
pub mod eslint;
pub mod flake8;
pub mod registry;
pub mod semgrep;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use crengine_core::{FileRecord, Finding, Language, ToolConfig};
use tokio::time::Instant;

use crate::error::AdapterError;
use crate::runner::{path_arg, ToolRunner};

/// Longest stderr excerpt kept in an `UnexpectedExit` error.
const STDERR_EXCERPT: usize = 500;

/// Everything one analyzer produced for one run.
#[derive(Debug, Default)]
pub struct AdapterOutput {
    pub findings: Vec<Finding>,

    /// Recoverable problems worth surfacing in the run summary.
    pub warnings: Vec<String>,

    /// Records that could not be parsed and were skipped.
    pub malformed_records: usize,

    /// Set when the tool failed as a whole; `findings` is then empty.
    pub error: Option<AdapterError>,
}

impl AdapterOutput {
    pub fn failed(error: AdapterError) -> Self {
        Self {
            warnings: vec![error.to_string()],
            error: Some(error),
            ..Self::default()
        }
    }

    /// Status label for the run summary.
    pub fn status(&self) -> &'static str {
        match &self.error {
            Some(e) => e.status(),
            None => "ok",
        }
    }
}

/// Plugin contract for one analysis tool.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Tool name; also the `tool` field of every finding it emits.
    fn name(&self) -> &str;

    /// Whether this analyzer should see `file`.
    fn accepts(&self, file: &FileRecord) -> bool;

    /// Analyze `files` (already filtered through [`accepts`](Self::accepts))
    /// relative to `cwd`. Never fails: problems are reported in the output.
    async fn execute(&self, files: &[FileRecord], cwd: &Path, timeout: Duration)
        -> AdapterOutput;
}

/// Findings parsed from one tool document.
#[derive(Debug, Default)]
pub struct ParsedOutput {
    pub findings: Vec<Finding>,
    pub malformed: usize,
}

/// Parse a tool's stdout. `Err` means the whole document is unusable.
pub type ParseFn = fn(&str) -> Result<ParsedOutput, String>;

/// Static description of a subprocess-backed tool.
pub struct ToolSpec {
    pub name: &'static str,
    pub languages: &'static [Language],
    pub binary: &'static str,
    pub args: &'static [&'static str],

    /// Exit codes that mean the tool ran (with or without findings).
    pub ok_exit_codes: &'static [i32],

    pub parse: ParseFn,
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("languages", &self.languages)
            .field("binary", &self.binary)
            .field("args", &self.args)
            .field("ok_exit_codes", &self.ok_exit_codes)
            .finish_non_exhaustive()
    }
}

/// Subprocess-backed analyzer built from a [`ToolSpec`] and its config.
#[derive(Debug, Clone)]
pub struct ToolAdapter {
    spec: &'static ToolSpec,
    binary: String,
    args: Vec<String>,
    batch_size: usize,
}

impl ToolAdapter {
    pub fn new(spec: &'static ToolSpec, config: &ToolConfig) -> Self {
        Self {
            spec,
            binary: config
                .binary
                .clone()
                .unwrap_or_else(|| spec.binary.to_string()),
            args: config
                .args
                .clone()
                .unwrap_or_else(|| spec.args.iter().map(|a| a.to_string()).collect()),
            batch_size: config.max_files_per_invocation.max(1),
        }
    }

    /// Argument vector for one batch.
    pub fn command_args(&self, batch: &[FileRecord]) -> Vec<String> {
        let mut args = self.args.clone();
        args.extend(batch.iter().map(|f| path_arg(&f.path)));
        args
    }
}

#[async_trait]
impl Analyzer for ToolAdapter {
    fn name(&self) -> &str {
        self.spec.name
    }

    fn accepts(&self, file: &FileRecord) -> bool {
        file.language
            .is_some_and(|lang| self.spec.languages.contains(&lang))
    }

    async fn execute(
        &self,
        files: &[FileRecord],
        cwd: &Path,
        timeout: Duration,
    ) -> AdapterOutput {
        let deadline = Instant::now() + timeout;
        let mut out = AdapterOutput::default();

        for batch in files.chunks(self.batch_size) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let args = self.command_args(batch);
            let output =
                match ToolRunner::run(self.spec.name, &self.binary, &args, cwd, remaining).await {
                    Ok(output) => output,
                    Err(AdapterError::Timeout { tool, .. }) => {
                        return AdapterOutput::failed(AdapterError::Timeout {
                            tool,
                            after: timeout,
                        })
                    }
                    Err(e) => return AdapterOutput::failed(e),
                };

            if !output.exited_with(self.spec.ok_exit_codes) {
                return AdapterOutput::failed(AdapterError::UnexpectedExit {
                    tool: self.spec.name.to_string(),
                    code: output.exit_code,
                    stderr: output.stderr.trim().chars().take(STDERR_EXCERPT).collect(),
                });
            }

            match (self.spec.parse)(&output.stdout) {
                Ok(parsed) => {
                    out.findings.extend(parsed.findings);
                    out.malformed_records += parsed.malformed;
                }
                Err(message) => {
                    return AdapterOutput::failed(AdapterError::MalformedOutput {
                        tool: self.spec.name.to_string(),
                        message,
                    })
                }
            }
        }

        if out.malformed_records > 0 {
            out.warnings.push(format!(
                "{}: skipped {} malformed record(s)",
                self.spec.name, out.malformed_records
            ));
        }
        out
    }
}

/// Parse a JSON document, treating blank output as "no findings".
pub(crate) fn parse_json_document(stdout: &str) -> Result<Option<serde_json::Value>, String> {
    if stdout.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(stdout)
        .map(Some)
        .map_err(|e| format!("invalid JSON: {e}"))
}

/// Read a positive line/column number from a JSON value.
pub(crate) fn json_u32(value: Option<&serde_json::Value>) -> Option<u32> {
    value
        .and_then(serde_json::Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
}
