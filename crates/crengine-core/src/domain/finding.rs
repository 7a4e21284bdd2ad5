//! Canonical finding shape shared by every analyzer adapter.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Finding severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Parse a tool-reported severity label.
    ///
    /// Accepts the canonical names in any case plus the common tool vocabulary
    /// (`error`, `warning`, `note`, ...). Unknown labels degrade to `Info`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "critical" | "blocker" | "fatal" => Self::Critical,
            "high" | "error" | "major" => Self::High,
            "medium" | "moderate" | "warning" | "warn" => Self::Medium,
            "low" | "minor" | "note" => Self::Low,
            _ => Self::Info,
        }
    }

    /// Normalized weight of this severity in `[0, 1]`.
    pub fn weight(&self) -> f64 {
        match self {
            Self::Critical => 1.0,
            Self::High => 0.85,
            Self::Medium => 0.6,
            Self::Low => 0.35,
            Self::Info => 0.2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One issue reported by an analysis tool at a specific file and line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Name of the tool that reported the finding.
    pub tool: String,

    /// Repository-relative path with forward slashes.
    pub file: String,

    /// 1-based line number; `0` marks a file-level finding.
    pub line: u32,

    /// 1-based column, when the tool reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,

    /// Tool-specific rule identifier.
    pub rule_id: String,

    pub severity: Severity,

    pub message: String,

    /// Lower-cased classification tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Fix suggestion supplied by the tool, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Finding {
    /// Create a finding with no column, tags or suggestion.
    pub fn new(
        tool: impl Into<String>,
        file: impl Into<String>,
        line: u32,
        rule_id: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tool: tool.into(),
            file: file.into(),
            line,
            column: None,
            rule_id: rule_id.into(),
            severity,
            message: message.into(),
            tags: BTreeSet::new(),
            suggestion: None,
        }
    }

    pub fn with_column(mut self, column: u32) -> Self {
        self.column = Some(column);
        self
    }

    /// Add tags; they are lower-cased on insertion.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for tag in tags {
            let tag = tag.as_ref().trim().to_ascii_lowercase();
            if !tag.is_empty() {
                self.tags.insert(tag);
            }
        }
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Identity of this finding within a run.
    pub fn key(&self) -> FindingKey {
        FindingKey {
            tool: self.tool.clone(),
            file: self.file.clone(),
            line: self.line,
            rule_id: self.rule_id.clone(),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn has_any_tag(&self, tags: &[&str]) -> bool {
        tags.iter().any(|t| self.tags.contains(*t))
    }

    /// Canonical report order: `(file, line, tool)`, then `(rule_id, column)`.
    pub fn report_order(&self, other: &Self) -> Ordering {
        self.file
            .cmp(&other.file)
            .then(self.line.cmp(&other.line))
            .then_with(|| self.tool.cmp(&other.tool))
            .then_with(|| self.rule_id.cmp(&other.rule_id))
            .then_with(|| self.column.cmp(&other.column))
    }

    /// Total order used to pick the survivor among duplicates.
    ///
    /// `Greater` means `self` carries more information than `other`.
    pub fn richness(&self, other: &Self) -> Ordering {
        self.message
            .chars()
            .count()
            .cmp(&other.message.chars().count())
            .then_with(|| self.message.cmp(&other.message))
            .then(self.severity.cmp(&other.severity))
            .then(self.column.cmp(&other.column))
            .then_with(|| self.suggestion.cmp(&other.suggestion))
    }
}

impl AsRef<Finding> for Finding {
    fn as_ref(&self) -> &Finding {
        self
    }
}

impl AsMut<Finding> for Finding {
    fn as_mut(&mut self) -> &mut Finding {
        self
    }
}

/// Identity of a finding: `(tool, file, line, rule_id)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FindingKey {
    pub tool: String,
    pub file: String,
    pub line: u32,
    pub rule_id: String,
}

impl fmt::Display for FindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.tool, self.file, self.line, self.rule_id)
    }
}
