//! Engine configuration.
//!
//! Loaded once from TOML (default `crengine.toml`), validated, and then passed
//! explicitly to every stage as an immutable value. Every section is optional;
//! missing sections and fields take the defaults below.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::digest::canonical_digest;
use crate::domain::error::{ConfigError, Result};
use crate::domain::phase::{Phase, PhaseRule};

/// Default config file name looked up in the repository root.
pub const DEFAULT_CONFIG_FILE: &str = "crengine.toml";

/// Signals that may appear in `scoring.difficulty_weights` / `scoring.value_weights`.
pub const KNOWN_SIGNALS: &[&str] = &[
    "severity",
    "code_complexity",
    "blast_radius",
    "test_coverage_gap",
    "tooling_fixability",
    "security_impact",
    "reliability_perf",
    "developer_experience",
    "user_value",
];

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub manifest: ManifestConfig,
    pub scoring: ScoringConfig,
    pub phases: PhaseConfig,
    pub pipeline: PipelineConfig,
    pub tools: BTreeMap<String, ToolConfig>,
    pub ai: AiConfig,
}

/// File enumeration filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManifestConfig {
    /// Globs a path must match to be listed. Empty means everything.
    pub include: Vec<String>,

    /// Globs that remove a path even when included.
    pub exclude: Vec<String>,

    /// Globs kept first when `max_files` truncates the list.
    pub priority: Vec<String>,

    /// Files larger than this many bytes are skipped.
    pub max_file_size: u64,

    /// Upper bound on listed files.
    pub max_files: usize,

    /// Honour `.gitignore` and friends while walking.
    pub respect_gitignore: bool,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: [
                ".crengine/**",
                "**/node_modules/**",
                "**/.venv/**",
                "**/venv/**",
                "**/__pycache__/**",
                "**/target/**",
                "**/dist/**",
                "**/build/**",
                "**/*.min.js",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            priority: Vec::new(),
            max_file_size: 1_048_576,
            max_files: 5_000,
            respect_gitignore: true,
        }
    }
}

/// Weighted scoring heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringConfig {
    pub difficulty_weights: BTreeMap<String, f64>,
    pub value_weights: BTreeMap<String, f64>,

    /// Estimated hours for difficulty 1 through 5.
    pub hours_by_difficulty: Vec<f64>,

    /// Tools whose findings are usually fixed mechanically.
    pub autofix_tools: Vec<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let weights = |pairs: &[(&str, f64)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<BTreeMap<_, _>>()
        };
        Self {
            difficulty_weights: weights(&[
                ("code_complexity", 0.25),
                ("blast_radius", 0.25),
                ("test_coverage_gap", 0.25),
                ("tooling_fixability", 0.25),
            ]),
            value_weights: weights(&[
                ("severity", 0.5),
                ("security_impact", 0.4),
                ("reliability_perf", 0.05),
                ("developer_experience", 0.025),
                ("user_value", 0.025),
            ]),
            hours_by_difficulty: vec![0.5, 1.0, 2.0, 6.0, 12.0],
            autofix_tools: vec!["flake8".to_string(), "pylint".to_string()],
        }
    }
}

/// Phase routing rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PhaseConfig {
    /// Phase for findings no rule matches.
    pub default_phase: Phase,
    pub rules: Vec<PhaseRule>,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        let table: &[(Phase, &[&str])] = &[
            (
                Phase::Hygiene,
                &["style", "lint", "format", "hygiene", "dead-code"],
            ),
            (Phase::Security, &["security", "secrets", "sast", "vuln"]),
            (
                Phase::Reliability,
                &["perf", "performance", "reliability", "bug", "correctness"],
            ),
            (
                Phase::DeveloperExperience,
                &[
                    "tests",
                    "docs",
                    "typing",
                    "complexity",
                    "pattern",
                    "maintainability",
                ],
            ),
            (Phase::Polish, &["ux", "api", "i18n"]),
        ];
        let rules = table
            .iter()
            .flat_map(|(phase, tags)| {
                tags.iter()
                    .enumerate()
                    .map(move |(i, tag)| PhaseRule::new(*tag, *phase, i as u32 + 1))
            })
            .collect();
        Self {
            default_phase: Phase::Polish,
            rules,
        }
    }
}

/// Worker pool and run limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Maximum adapter invocations in flight.
    pub max_concurrency: usize,

    /// Wall-clock limit for the whole adapter stage.
    pub run_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            run_timeout_secs: 900,
        }
    }
}

/// Per-tool adapter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    pub enabled: bool,

    /// Override for the executable (name on `PATH` or absolute path).
    pub binary: Option<String>,

    /// Replaces the adapter's default argument vector.
    pub args: Option<Vec<String>>,

    pub timeout_secs: u64,
    pub max_files_per_invocation: usize,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            binary: None,
            args: None,
            timeout_secs: 300,
            max_files_per_invocation: 200,
        }
    }
}

/// Supported patch-drafting providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProviderKind {
    None,
    Openai,
}

impl std::str::FromStr for AiProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "off" => Ok(Self::None),
            "openai" => Ok(Self::Openai),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

/// Optional AI patch-drafting stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AiConfig {
    /// `"none"` disables the stage.
    pub provider: String,
    pub model: String,

    /// Chat-completions URL of an OpenAI-compatible service.
    pub endpoint: String,

    /// Environment variable holding the API key. The key itself is never stored.
    pub api_key_env: String,

    /// Top-scored findings drafted per run.
    pub max_findings: usize,
    pub rate_limit_rps: f64,
    pub max_output_tokens: u32,
    pub temperature: f64,

    /// Source lines shown before and after the target line.
    pub context_lines: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: "none".to_string(),
            model: "gpt-4o-mini".to_string(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_findings: 10,
            rate_limit_rps: 1.0,
            max_output_tokens: 1024,
            temperature: 0.2,
            context_lines: 5,
        }
    }
}

impl AiConfig {
    pub fn provider_kind(&self) -> std::result::Result<AiProviderKind, ConfigError> {
        self.provider.parse()
    }
}

impl EngineConfig {
    /// Read, parse and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load `crengine.toml` from `repo` when present, defaults otherwise.
    pub fn discover(repo: &Path) -> Result<Self> {
        let candidate = repo.join(DEFAULT_CONFIG_FILE);
        if candidate.is_file() {
            Self::load(&candidate)
        } else {
            let config = Self::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every invariant the stages rely on.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        validate_weights("difficulty", &self.scoring.difficulty_weights)?;
        validate_weights("value", &self.scoring.value_weights)?;
        validate_hours(&self.scoring.hours_by_difficulty)?;
        validate_rules(&self.phases.rules)?;
        validate_globs(&self.manifest)?;

        if self.manifest.max_files == 0 {
            return Err(limit("manifest.max_files", "must be at least 1"));
        }
        if self.pipeline.max_concurrency == 0 {
            return Err(limit("pipeline.max_concurrency", "must be at least 1"));
        }
        if self.pipeline.run_timeout_secs == 0 {
            return Err(limit("pipeline.run_timeout_secs", "must be at least 1"));
        }
        for (name, tool) in &self.tools {
            if tool.timeout_secs == 0 {
                return Err(limit(
                    &format!("tools.{name}.timeout_secs"),
                    "must be at least 1",
                ));
            }
            if tool.max_files_per_invocation == 0 {
                return Err(limit(
                    &format!("tools.{name}.max_files_per_invocation"),
                    "must be at least 1",
                ));
            }
        }

        self.ai.provider_kind()?;
        if !(self.ai.rate_limit_rps.is_finite() && self.ai.rate_limit_rps > 0.0) {
            return Err(limit("ai.rate_limit_rps", "must be a positive number"));
        }
        if !(0.0..=2.0).contains(&self.ai.temperature) {
            return Err(limit("ai.temperature", "must be within [0, 2]"));
        }
        Ok(())
    }

    /// Settings for `tool`, falling back to defaults when unconfigured.
    pub fn tool(&self, name: &str) -> ToolConfig {
        self.tools.get(name).cloned().unwrap_or_default()
    }

    /// SHA-256 of the canonical JSON form of this config.
    pub fn digest(&self) -> Result<String> {
        Ok(canonical_digest(self)?)
    }
}

fn limit(field: &str, message: &str) -> ConfigError {
    ConfigError::Limit {
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn validate_weights(
    dimension: &str,
    weights: &BTreeMap<String, f64>,
) -> std::result::Result<(), ConfigError> {
    if weights.is_empty() {
        return Err(ConfigError::EmptyWeights {
            dimension: dimension.to_string(),
        });
    }
    for (signal, weight) in weights {
        if !KNOWN_SIGNALS.contains(&signal.as_str()) {
            return Err(ConfigError::UnknownSignal {
                dimension: dimension.to_string(),
                signal: signal.clone(),
            });
        }
        if !weight.is_finite() || *weight < 0.0 {
            return Err(ConfigError::InvalidWeight {
                dimension: dimension.to_string(),
                signal: signal.clone(),
                weight: *weight,
            });
        }
    }
    let sum: f64 = weights.values().sum();
    if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(ConfigError::WeightSum {
            dimension: dimension.to_string(),
            sum,
        });
    }
    Ok(())
}

fn validate_hours(hours: &[f64]) -> std::result::Result<(), ConfigError> {
    if hours.len() != 5 {
        return Err(ConfigError::HoursTable(format!(
            "expected 5 entries, got {}",
            hours.len()
        )));
    }
    if hours.iter().any(|h| !h.is_finite() || *h < 0.0) {
        return Err(ConfigError::HoursTable(
            "entries must be non-negative".to_string(),
        ));
    }
    if hours.windows(2).any(|w| w[1] < w[0]) {
        return Err(ConfigError::HoursTable(
            "entries must be non-decreasing".to_string(),
        ));
    }
    Ok(())
}

fn validate_rules(rules: &[PhaseRule]) -> std::result::Result<(), ConfigError> {
    let mut seen: HashMap<String, Phase> = HashMap::new();
    for rule in rules {
        let tag = rule.tag.trim().to_ascii_lowercase();
        if tag.is_empty() {
            return Err(ConfigError::PhaseRule("tag must not be empty".to_string()));
        }
        if rule.priority == 0 {
            return Err(ConfigError::PhaseRule(format!(
                "priority for tag {tag} must be at least 1"
            )));
        }
        if let Some(first) = seen.get(&tag) {
            if *first != rule.phase {
                return Err(ConfigError::ConflictingTag {
                    tag,
                    first: first.slug().to_string(),
                    second: rule.phase.slug().to_string(),
                });
            }
        } else {
            seen.insert(tag, rule.phase);
        }
    }
    Ok(())
}

fn validate_globs(manifest: &ManifestConfig) -> std::result::Result<(), ConfigError> {
    manifest
        .include
        .iter()
        .chain(&manifest.exclude)
        .chain(&manifest.priority)
        .try_for_each(|pattern| {
            globset::Glob::new(pattern)
                .map(|_| ())
                .map_err(|e| ConfigError::Glob {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::EngineError;

    fn config_err(result: Result<EngineConfig>) -> ConfigError {
        match result {
            Err(EngineError::Config(e)) => e,
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.phases.default_phase, Phase::Polish);
        assert_eq!(config.phases.rules.len(), 23);
        assert_eq!(config.ai.provider_kind().unwrap(), AiProviderKind::None);
    }

    #[test]
    fn empty_document_yields_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn parses_every_section() {
        let toml = r#"
            [manifest]
            include = ["src/**"]
            max_files = 10

            [scoring]
            difficulty_weights = { code_complexity = 0.5, blast_radius = 0.5 }
            value_weights = { severity = 1.0 }

            [phases]
            default_phase = "developer_experience"

            [[phases.rules]]
            tag = "security"
            phase = "security"
            priority = 1

            [pipeline]
            max_concurrency = 2

            [tools.flake8]
            enabled = false
            args = ["--max-line-length=120"]

            [ai]
            provider = "openai"
            max_findings = 3
        "#;
        let config = EngineConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.manifest.include, vec!["src/**".to_string()]);
        assert_eq!(config.phases.rules.len(), 1);
        assert_eq!(config.phases.default_phase, Phase::DeveloperExperience);
        assert!(!config.tool("flake8").enabled);
        assert!(config.tool("bandit").enabled);
        assert_eq!(config.ai.provider_kind().unwrap(), AiProviderKind::Openai);
    }

    #[test]
    fn rejects_weights_not_summing_to_one() {
        let err = config_err(EngineConfig::from_toml_str(
            "[scoring]\nvalue_weights = { severity = 0.5, user_value = 0.4 }\n",
        ));
        assert!(matches!(err, ConfigError::WeightSum { .. }));
    }

    #[test]
    fn rejects_unknown_signal_and_negative_weight() {
        let err = config_err(EngineConfig::from_toml_str(
            "[scoring]\nvalue_weights = { churn = 1.0 }\n",
        ));
        assert!(matches!(err, ConfigError::UnknownSignal { .. }));

        let err = config_err(EngineConfig::from_toml_str(
            "[scoring]\nvalue_weights = { severity = 1.5, user_value = -0.5 }\n",
        ));
        assert!(matches!(err, ConfigError::InvalidWeight { .. }));
    }

    #[test]
    fn rejects_empty_weights() {
        let err = config_err(EngineConfig::from_toml_str(
            "[scoring]\ndifficulty_weights = {}\n",
        ));
        assert!(matches!(err, ConfigError::EmptyWeights { .. }));
    }

    #[test]
    fn rejects_decreasing_hours() {
        let err = config_err(EngineConfig::from_toml_str(
            "[scoring]\nhours_by_difficulty = [1.0, 0.5, 2.0, 3.0, 4.0]\n",
        ));
        assert!(matches!(err, ConfigError::HoursTable(_)));
    }

    #[test]
    fn rejects_tag_in_two_phases() {
        let toml = r#"
            [[phases.rules]]
            tag = "perf"
            phase = "reliability"
            priority = 1

            [[phases.rules]]
            tag = "PERF"
            phase = "polish"
            priority = 2
        "#;
        let err = config_err(EngineConfig::from_toml_str(toml));
        assert!(matches!(err, ConfigError::ConflictingTag { .. }));
    }

    #[test]
    fn rejects_zero_priority_and_empty_tag() {
        let err = config_err(EngineConfig::from_toml_str(
            "[[phases.rules]]\ntag = \"x\"\nphase = \"polish\"\npriority = 0\n",
        ));
        assert!(matches!(err, ConfigError::PhaseRule(_)));

        let err = config_err(EngineConfig::from_toml_str(
            "[[phases.rules]]\ntag = \" \"\nphase = \"polish\"\npriority = 1\n",
        ));
        assert!(matches!(err, ConfigError::PhaseRule(_)));
    }

    #[test]
    fn rejects_unknown_fields_and_providers() {
        let err = config_err(EngineConfig::from_toml_str("[pipeline]\nworkers = 3\n"));
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = config_err(EngineConfig::from_toml_str("[ai]\nprovider = \"mystery\"\n"));
        assert!(matches!(err, ConfigError::UnknownProvider(_)));
    }

    #[test]
    fn rejects_bad_glob_and_zero_limits() {
        let err = config_err(EngineConfig::from_toml_str("[manifest]\nexclude = [\"a[\"]\n"));
        assert!(matches!(err, ConfigError::Glob { .. }));

        let err = config_err(EngineConfig::from_toml_str(
            "[pipeline]\nmax_concurrency = 0\n",
        ));
        assert!(matches!(err, ConfigError::Limit { .. }));
    }

    #[test]
    fn digest_tracks_content() {
        let a = EngineConfig::default();
        let mut b = EngineConfig::default();
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
        b.pipeline.max_concurrency = 8;
        assert_ne!(a.digest().unwrap(), b.digest().unwrap());
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = config_err(EngineConfig::load(&dir.path().join("nope.toml")));
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn discover_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::discover(dir.path()).unwrap();
        assert_eq!(config, EngineConfig::default());

        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            "[pipeline]\nmax_concurrency = 7\n",
        )
        .unwrap();
        let config = EngineConfig::discover(dir.path()).unwrap();
        assert_eq!(config.pipeline.max_concurrency, 7);
    }
}
