//! Improvement-plan phases and the tag rules that route findings into them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the five ordered improvement-plan buckets.
///
/// Lower ordinal means higher priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Hygiene,
    Security,
    Reliability,
    DeveloperExperience,
    Polish,
}

impl Phase {
    /// Every phase in ordinal order.
    pub const ALL: [Phase; 5] = [
        Phase::Hygiene,
        Phase::Security,
        Phase::Reliability,
        Phase::DeveloperExperience,
        Phase::Polish,
    ];

    pub fn ordinal(&self) -> u8 {
        match self {
            Phase::Hygiene => 0,
            Phase::Security => 1,
            Phase::Reliability => 2,
            Phase::DeveloperExperience => 3,
            Phase::Polish => 4,
        }
    }

    /// Human-readable phase title.
    pub fn title(&self) -> &'static str {
        match self {
            Phase::Hygiene => "Repo Hygiene",
            Phase::Security => "Security & Safety",
            Phase::Reliability => "Reliability & Performance",
            Phase::DeveloperExperience => "Developer Experience",
            Phase::Polish => "Product Polish",
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            Phase::Hygiene => "hygiene",
            Phase::Security => "security",
            Phase::Reliability => "reliability",
            Phase::DeveloperExperience => "developer_experience",
            Phase::Polish => "polish",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Phase {} - {}", self.ordinal(), self.title())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Phase::ALL
            .iter()
            .copied()
            .find(|p| p.slug() == wanted || p.ordinal().to_string() == wanted)
            .ok_or_else(|| format!("unknown phase: {s}"))
    }
}

/// Maps one tag to a phase with a priority rank (1 = strongest).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRule {
    pub tag: String,
    pub phase: Phase,
    pub priority: u32,
}

impl PhaseRule {
    pub fn new(tag: impl Into<String>, phase: Phase, priority: u32) -> Self {
        Self {
            tag: tag.into(),
            phase,
            priority,
        }
    }
}
