//! Optional AI patch drafting, run after consolidation.
//!
//! The top `ai.max_findings` items (value desc, then composite, then finding
//! order) are sent to a [`PatchDrafter`] one at a time, paced by a
//! [`RateLimiter`]. Provider failures are recorded and never fail the run.

pub mod openai;
pub mod prompt;
pub mod rate_limit;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use crengine_core::{AiConfig, AiProviderKind, Finding, FindingKey, ScoredItem};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::AiProviderError;
pub use openai::OpenAiDrafter;
pub use prompt::{extract_context, PromptTemplate, SourceContext};
pub use rate_limit::RateLimiter;

/// Everything a drafter needs about one finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingContext {
    pub finding: Finding,
    pub template: PromptTemplate,
    pub source: SourceContext,

    /// Rendered user prompt.
    pub prompt: String,
}

impl FindingContext {
    /// Build the context for `finding`, reading source from under `repo`.
    pub fn build(finding: &Finding, repo: &Path, context_lines: usize) -> Self {
        let source = extract_context(&repo.join(&finding.file), finding.line, context_lines);
        let template = PromptTemplate::for_finding(finding);
        let prompt = template.render(finding, &source);
        Self {
            finding: finding.clone(),
            template,
            source,
            prompt,
        }
    }
}

/// AI provider collaborator.
#[async_trait]
pub trait PatchDrafter: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Draft a patch for one finding.
    async fn draft_patch(&self, context: &FindingContext) -> Result<String, AiProviderError>;
}

/// One drafted patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchDraft {
    pub key: FindingKey,
    pub value: u8,
    pub difficulty: u8,
    pub template: PromptTemplate,
    pub patch: String,
}

/// A finding the provider could not draft for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftFailure {
    pub key: FindingKey,
    pub error: String,
}

/// Contents of the AI patches artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiDrafts {
    pub provider: String,
    pub model: String,
    pub drafts: Vec<PatchDraft>,
    pub failures: Vec<DraftFailure>,
}

/// Build the configured drafter; `Ok(None)` when drafting is disabled.
pub fn drafter_from_config(
    config: &AiConfig,
) -> Result<Option<Arc<dyn PatchDrafter>>, AiProviderError> {
    match config.provider_kind() {
        Ok(AiProviderKind::None) => Ok(None),
        Ok(AiProviderKind::Openai) => Ok(Some(Arc::new(OpenAiDrafter::from_config(config)?))),
        Err(_) => Err(AiProviderError::Unsupported(config.provider.clone())),
    }
}

/// Up to `limit` items, highest value first, then highest composite, then
/// input order. `items` is expected in normalized order.
pub fn select_top(items: &[ScoredItem], limit: usize) -> Vec<&ScoredItem> {
    let mut ranked: Vec<(usize, &ScoredItem)> = items.iter().enumerate().collect();
    ranked.sort_by(|(ia, a), (ib, b)| {
        b.value
            .cmp(&a.value)
            .then(b.composite().cmp(&a.composite()))
            .then(ia.cmp(ib))
    });
    ranked.into_iter().take(limit).map(|(_, item)| item).collect()
}

/// Draft patches for the top items. Sequential and rate limited.
pub async fn draft_patches(
    drafter: &dyn PatchDrafter,
    items: &[ScoredItem],
    repo: &Path,
    config: &AiConfig,
) -> AiDrafts {
    let limiter = RateLimiter::new(config.rate_limit_rps);
    let mut drafts = Vec::new();
    let mut failures = Vec::new();

    for item in select_top(items, config.max_findings) {
        let context = FindingContext::build(&item.finding, repo, config.context_lines);
        limiter.acquire().await;
        match drafter.draft_patch(&context).await {
            Ok(patch) => drafts.push(PatchDraft {
                key: item.finding.key(),
                value: item.value,
                difficulty: item.difficulty,
                template: context.template,
                patch,
            }),
            Err(e) => {
                warn!(
                    event = "ai.draft_failed",
                    provider = %drafter.name(),
                    file = %item.finding.file,
                    line = item.finding.line,
                    error = %e,
                );
                failures.push(DraftFailure {
                    key: item.finding.key(),
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        event = "ai.drafted",
        provider = %drafter.name(),
        drafts = drafts.len(),
        failures = failures.len(),
    );
    AiDrafts {
        provider: drafter.name().to_string(),
        model: drafter.model().to_string(),
        drafts,
        failures,
    }
}
