//! Scored findings.

use serde::{Deserialize, Serialize};

use super::finding::Finding;

/// A finding with its two priority scores and effort estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub finding: Finding,

    /// Difficulty/Risk score, `1..=5`.
    pub difficulty: u8,

    /// Value/Importance score, `1..=5`.
    pub value: u8,

    /// Estimated person-hours, derived from `difficulty` only.
    pub estimated_hours: f64,
}

impl ScoredItem {
    /// `value × difficulty`, the within-phase sort key.
    pub fn composite(&self) -> u32 {
        u32::from(self.value) * u32::from(self.difficulty)
    }
}

impl AsRef<Finding> for ScoredItem {
    fn as_ref(&self) -> &Finding {
        &self.finding
    }
}

impl AsMut<Finding> for ScoredItem {
    fn as_mut(&mut self) -> &mut Finding {
        &mut self.finding
    }
}
