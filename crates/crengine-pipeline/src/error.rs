//! Recoverable failure kinds of the pipeline.
//!
//! Neither type aborts a run: an adapter failure means the tool contributes
//! zero findings, an AI failure means no draft for that finding. Both end up
//! as warnings in the run summary.

use std::time::Duration;

/// Why one analyzer produced no usable output.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("{tool}: binary {binary} is not installed")]
    NotInstalled { tool: String, binary: String },

    #[error("{tool}: failed to spawn: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool}: timed out after {}s", .after.as_secs())]
    Timeout { tool: String, after: Duration },

    #[error("{tool}: unexpected exit code {code:?}: {stderr}")]
    UnexpectedExit {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{tool}: malformed output: {message}")]
    MalformedOutput { tool: String, message: String },

    #[error("{tool}: task failed: {message}")]
    Task { tool: String, message: String },
}

impl AdapterError {
    /// Short status label recorded per tool in the run summary.
    pub fn status(&self) -> &'static str {
        match self {
            Self::NotInstalled { .. } => "not_installed",
            Self::Spawn { .. } => "spawn_failed",
            Self::Timeout { .. } => "timeout",
            Self::UnexpectedExit { .. } => "unexpected_exit",
            Self::MalformedOutput { .. } => "malformed_output",
            Self::Task { .. } => "task_failed",
        }
    }
}

/// Failure of the AI patch drafting collaborator.
#[derive(Debug, thiserror::Error)]
pub enum AiProviderError {
    #[error("API key environment variable {0} is not set")]
    MissingApiKey(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider returned no content")]
    EmptyResponse,

    #[error("provider {0} is not supported")]
    Unsupported(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_display_uses_seconds() {
        let err = AdapterError::Timeout {
            tool: "semgrep".to_string(),
            after: Duration::from_secs(300),
        };
        assert_eq!(err.to_string(), "semgrep: timed out after 300s");
        assert_eq!(err.status(), "timeout");
    }

    #[test]
    fn missing_key_names_variable() {
        let err = AiProviderError::MissingApiKey("OPENAI_API_KEY".to_string());
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
