//! Scoring engine.
//!
//! Each finding gets a Difficulty/Risk and a Value/Importance score on a
//! 1..=5 scale from weighted signals in `[0, 1]`:
//! `score = clamp(round(1 + 4 × Σ wᵢ·sᵢ), 1, 5)`. Scoring is a pure function
//! of the finding and the [`ScoringConfig`].

use std::collections::BTreeSet;

use crate::config::ScoringConfig;
use crate::domain::finding::Finding;
use crate::domain::scored::ScoredItem;

const SECURITY_TAGS: &[&str] = &["security", "secrets", "sast"];
const RELIABILITY_TAGS: &[&str] = &["perf", "performance", "reliability"];
const DX_TAGS: &[&str] = &["tests", "docs", "typing"];
const USER_TAGS: &[&str] = &["ux", "api", "i18n"];

/// Sub-score in `[0, 1]` for one named signal.
///
/// Unknown names contribute `0.0`; config validation rejects them up front.
pub fn signal(name: &str, finding: &Finding, autofix_tools: &BTreeSet<&str>) -> f64 {
    let severity = finding.severity.weight();
    match name {
        "severity" | "code_complexity" => severity,
        "blast_radius" => {
            if finding.has_any_tag(SECURITY_TAGS) {
                1.0
            } else {
                0.7
            }
        }
        "test_coverage_gap" => {
            if finding.has_tag("tests") {
                0.8
            } else {
                0.5
            }
        }
        "tooling_fixability" => {
            if autofix_tools.contains(finding.tool.as_str()) {
                0.3
            } else {
                0.7
            }
        }
        "security_impact" => {
            if finding.has_any_tag(SECURITY_TAGS) {
                severity
            } else {
                0.0
            }
        }
        "reliability_perf" => {
            if finding.has_any_tag(RELIABILITY_TAGS) {
                severity
            } else {
                0.3
            }
        }
        "developer_experience" => {
            if finding.has_any_tag(DX_TAGS) {
                0.6
            } else {
                0.3
            }
        }
        "user_value" => {
            if finding.has_any_tag(USER_TAGS) {
                0.7
            } else {
                0.2
            }
        }
        _ => 0.0,
    }
}

/// Map a weighted sum in `[0, 1]` onto the 1..=5 scale.
///
/// `f64::round` rounds half away from zero.
pub fn to_scale(weighted: f64) -> u8 {
    let raw = (1.0 + 4.0 * weighted).round();
    raw.clamp(1.0, 5.0) as u8
}

/// Stateless scorer bound to one validated scoring config.
#[derive(Debug, Clone)]
pub struct Scorer<'a> {
    config: &'a ScoringConfig,
    autofix: BTreeSet<&'a str>,
}

impl<'a> Scorer<'a> {
    pub fn new(config: &'a ScoringConfig) -> Self {
        let autofix = config.autofix_tools.iter().map(String::as_str).collect();
        Self { config, autofix }
    }

    fn weighted(&self, weights: &std::collections::BTreeMap<String, f64>, finding: &Finding) -> f64 {
        weights
            .iter()
            .map(|(name, w)| w * signal(name, finding, &self.autofix))
            .sum()
    }

    pub fn difficulty(&self, finding: &Finding) -> u8 {
        to_scale(self.weighted(&self.config.difficulty_weights, finding))
    }

    pub fn value(&self, finding: &Finding) -> u8 {
        to_scale(self.weighted(&self.config.value_weights, finding))
    }

    /// Hours for `difficulty` from the lookup table.
    pub fn hours(&self, difficulty: u8) -> f64 {
        let idx = usize::from(difficulty.clamp(1, 5)) - 1;
        self.config
            .hours_by_difficulty
            .get(idx)
            .copied()
            .unwrap_or_default()
    }

    pub fn score(&self, finding: Finding) -> ScoredItem {
        let difficulty = self.difficulty(&finding);
        let value = self.value(&finding);
        ScoredItem {
            estimated_hours: self.hours(difficulty),
            finding,
            difficulty,
            value,
        }
    }

    /// Score every finding, preserving input order.
    pub fn score_all(&self, findings: impl IntoIterator<Item = Finding>) -> Vec<ScoredItem> {
        findings.into_iter().map(|f| self.score(f)).collect()
    }
}
