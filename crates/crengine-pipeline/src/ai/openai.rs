//! OpenAI-compatible chat completions provider.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use crengine_core::AiConfig;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use super::prompt::SYSTEM_PROMPT;
use super::{FindingContext, PatchDrafter};
use crate::error::AiProviderError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct OpenAiDrafter {
    http_client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_output_tokens: u32,
    temperature: f64,
}

impl OpenAiDrafter {
    /// Build from config, reading the API key from `config.api_key_env`.
    pub fn from_config(config: &AiConfig) -> Result<Self, AiProviderError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AiProviderError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(config, api_key)
    }

    pub fn new(config: &AiConfig, api_key: String) -> Result<Self, AiProviderError> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http_client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
        })
    }

    /// JSON body of one chat completion request.
    pub fn request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
            "max_tokens": self.max_output_tokens,
            "temperature": self.temperature,
        })
    }
}

impl std::fmt::Debug for OpenAiDrafter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiDrafter")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Message content of the first choice.
pub fn response_content(body: &Value) -> Result<String, AiProviderError> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(AiProviderError::EmptyResponse)
}

/// Opening fence with optional info string, body, closing fence.
static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)```").expect("valid fence regex")
});

/// The first fenced code block of `content`, or all of it when there is none.
pub fn extract_patch(content: &str) -> String {
    match FENCE.captures(content).and_then(|c| c.get(1)) {
        Some(block) => block.as_str().trim_end().to_string(),
        None => content.trim().to_string(),
    }
}

#[async_trait]
impl PatchDrafter for OpenAiDrafter {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn draft_patch(&self, context: &FindingContext) -> Result<String, AiProviderError> {
        debug!(
            file = %context.finding.file,
            line = context.finding.line,
            model = %self.model,
            "requesting patch draft"
        );
        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(&context.prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiProviderError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }
        let body: Value = response.json().await?;
        Ok(extract_patch(&response_content(&body)?))
    }
}
