//! Phase consolidator.
//!
//! Routes every scored item to exactly one [`Phase`] using the tag rule
//! table, orders each phase by descending `value × difficulty`, and attaches
//! a recommendation. Items are never dropped: unmatched items land in the
//! configured catch-all phase.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::PhaseConfig;
use crate::domain::finding::Finding;
use crate::domain::phase::Phase;
use crate::domain::scored::ScoredItem;
use crate::recommend::{recommend, Recommendation};

/// One item placed in the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedItem {
    pub item: ScoredItem,

    /// Tag of the rule that routed the item; absent for catch-all items.
    pub primary_tag: Option<String>,
    pub recommendation: Recommendation,
}

/// All items routed to one phase, best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseGroup {
    pub phase: Phase,
    pub title: String,
    pub items: Vec<PlannedItem>,
    pub estimated_hours: f64,
}

/// Plan-wide totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTotals {
    pub items: usize,
    pub estimated_hours: f64,
}

/// The sequenced improvement plan: all five phases in ordinal order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasePlan {
    pub phases: Vec<PhaseGroup>,
    pub totals: PlanTotals,
}

impl PhasePlan {
    pub fn phase(&self, phase: Phase) -> Option<&PhaseGroup> {
        self.phases.iter().find(|g| g.phase == phase)
    }
}

/// Tag → `(phase, priority)` lookup built from the rule table.
#[derive(Debug, Clone)]
pub struct PhaseRouter {
    rules: BTreeMap<String, (Phase, u32)>,
    default_phase: Phase,
}

impl PhaseRouter {
    pub fn new(config: &PhaseConfig) -> Self {
        let mut rules: BTreeMap<String, (Phase, u32)> = BTreeMap::new();
        for rule in &config.rules {
            let tag = rule.tag.trim().to_ascii_lowercase();
            let entry = rules.entry(tag).or_insert((rule.phase, rule.priority));
            if rule.phase == entry.0 && rule.priority < entry.1 {
                entry.1 = rule.priority;
            }
        }
        Self {
            rules,
            default_phase: config.default_phase,
        }
    }

    /// Phase and primary tag for `finding`.
    ///
    /// The lowest-ordinal matching phase wins; within it the best priority,
    /// then the tag name, names the primary tag.
    pub fn route(&self, finding: &Finding) -> (Phase, Option<String>) {
        finding
            .tags
            .iter()
            .filter_map(|tag| {
                self.rules
                    .get(&tag.to_ascii_lowercase())
                    .map(|(phase, priority)| (*phase, *priority, tag))
            })
            .min()
            .map(|(phase, _, tag)| (phase, Some(tag.to_ascii_lowercase())))
            .unwrap_or((self.default_phase, None))
    }
}

/// Build the plan. `items` should already be normalized; its order breaks
/// composite-score ties.
pub fn consolidate(items: &[ScoredItem], config: &PhaseConfig) -> PhasePlan {
    let router = PhaseRouter::new(config);
    let mut buckets: BTreeMap<Phase, Vec<(usize, PlannedItem)>> =
        Phase::ALL.iter().map(|p| (*p, Vec::new())).collect();

    for (idx, item) in items.iter().enumerate() {
        let (phase, primary_tag) = router.route(&item.finding);
        let recommendation = recommend(item, primary_tag.as_deref());
        buckets.entry(phase).or_default().push((
            idx,
            PlannedItem {
                item: item.clone(),
                primary_tag,
                recommendation,
            },
        ));
    }

    let mut total_hours = 0.0;
    let phases = buckets
        .into_iter()
        .map(|(phase, mut planned)| {
            planned.sort_by(|(ia, a), (ib, b)| {
                b.item
                    .composite()
                    .cmp(&a.item.composite())
                    .then(ia.cmp(ib))
            });
            let items: Vec<PlannedItem> = planned.into_iter().map(|(_, p)| p).collect();
            let estimated_hours: f64 = items.iter().map(|p| p.item.estimated_hours).sum();
            total_hours += estimated_hours;
            PhaseGroup {
                phase,
                title: phase.to_string(),
                items,
                estimated_hours,
            }
        })
        .collect();

    PhasePlan {
        phases,
        totals: PlanTotals {
            items: items.len(),
            estimated_hours: total_hours,
        },
    }
}
