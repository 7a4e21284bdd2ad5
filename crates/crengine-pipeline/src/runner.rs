//! Subprocess execution for analyzer tools.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::debug;

use crate::error::AdapterError;

/// Captured result of one tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,

    pub stdout: String,

    pub stderr: String,

    pub duration_ms: u64,
}

impl ToolOutput {
    /// Whether the exit code is one of `accepted`.
    pub fn exited_with(&self, accepted: &[i32]) -> bool {
        self.exit_code.is_some_and(|code| accepted.contains(&code))
    }
}

/// Render a repository-relative path as a command-line argument.
///
/// Paths beginning with `-` are prefixed with `./` so the tool cannot read
/// them as options.
pub fn path_arg(path: &str) -> String {
    if path.starts_with('-') {
        format!("./{path}")
    } else {
        path.to_string()
    }
}

/// Runs analyzer binaries with an explicit argument vector (never a shell).
pub struct ToolRunner;

impl ToolRunner {
    /// Run `binary args..` in `cwd`, killing the child after `timeout`.
    ///
    /// The child is spawned with `kill_on_drop`, so dropping the returned
    /// future (e.g. when the surrounding task is aborted) also kills it.
    pub async fn run(
        tool: &str,
        binary: &str,
        args: &[String],
        cwd: &Path,
        timeout: Duration,
    ) -> Result<ToolOutput, AdapterError> {
        let start = Instant::now();
        debug!(tool = %tool, binary = %binary, args = args.len(), "spawning analyzer");

        let child = Command::new(binary)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| match source.kind() {
                std::io::ErrorKind::NotFound => AdapterError::NotInstalled {
                    tool: tool.to_string(),
                    binary: binary.to_string(),
                },
                _ => AdapterError::Spawn {
                    tool: tool.to_string(),
                    source,
                },
            })?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| AdapterError::Timeout {
                tool: tool.to_string(),
                after: timeout,
            })?
            .map_err(|source| AdapterError::Spawn {
                tool: tool.to_string(),
                source,
            })?;

        Ok(ToolOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
