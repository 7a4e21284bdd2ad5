//! Property-based tests for crengine-core.
//!
//! Covers the pipeline invariants that must hold for arbitrary finding sets:
//! order-independent normalization, dedup idempotence, score bounds, phase
//! exclusivity and delta-merge soundness.

use std::collections::BTreeMap;

use proptest::prelude::*;

use crengine_core::config::{PhaseConfig, ScoringConfig};
use crengine_core::delta::DiffScope;
use crengine_core::{consolidate, merge, normalize, normalize_scored, Finding, Scorer, Severity};

// ============================================================================
// Strategies
// ============================================================================

fn arb_severity() -> impl Strategy<Value = Severity> {
    prop_oneof![
        Just(Severity::Info),
        Just(Severity::Low),
        Just(Severity::Medium),
        Just(Severity::High),
        Just(Severity::Critical),
    ]
}

fn arb_tag() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("style".to_string()),
        Just("security".to_string()),
        Just("secrets".to_string()),
        Just("perf".to_string()),
        Just("tests".to_string()),
        Just("docs".to_string()),
        Just("api".to_string()),
        Just("Lint".to_string()),
        "[a-z]{1,8}",
    ]
}

fn arb_finding() -> impl Strategy<Value = Finding> {
    (
        prop_oneof![Just("flake8"), Just("bandit"), Just("semgrep"), Just("eslint")],
        prop_oneof![Just("a.py"), Just("b.py"), Just("src/c.js"), Just("./d.py")],
        0u32..40,
        prop_oneof![Just("R1"), Just("R2"), Just("E501")],
        arb_severity(),
        "[a-z ]{0,12}",
        proptest::collection::vec(arb_tag(), 0..4),
        proptest::option::of(1u32..80),
    )
        .prop_map(|(tool, file, line, rule, severity, message, tags, column)| {
            let mut f = Finding::new(tool, file, line, rule, severity, message).with_tags(tags);
            f.column = column;
            f
        })
}

fn arb_findings() -> impl Strategy<Value = Vec<Finding>> {
    proptest::collection::vec(arb_finding(), 0..30)
}

fn arb_weights(names: &'static [&'static str]) -> impl Strategy<Value = BTreeMap<String, f64>> {
    proptest::collection::vec(1u32..100, names.len()).prop_map(move |raw| {
        let total: u32 = raw.iter().sum();
        names
            .iter()
            .zip(raw)
            .map(|(n, r)| (n.to_string(), f64::from(r) / f64::from(total)))
            .collect()
    })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn normalization_ignores_input_order(findings in arb_findings(), seed in any::<u64>()) {
        let mut shuffled = findings.clone();
        // deterministic rotation + reverse as a cheap permutation
        if !shuffled.is_empty() {
            let k = (seed as usize) % shuffled.len();
            shuffled.rotate_left(k);
            if seed % 2 == 0 {
                shuffled.reverse();
            }
        }
        prop_assert_eq!(normalize(findings, None), normalize(shuffled, None));
    }

    #[test]
    fn dedup_is_idempotent(findings in arb_findings()) {
        let once = normalize(findings, None);
        let doubled: Vec<Finding> = once.iter().cloned().chain(once.iter().cloned()).collect();
        prop_assert_eq!(normalize(doubled, None), once.clone());
        prop_assert_eq!(normalize(once.clone(), None), once);
    }

    #[test]
    fn identities_are_unique_after_normalization(findings in arb_findings()) {
        let out = normalize(findings, None);
        let mut keys: Vec<_> = out.iter().map(Finding::key).collect();
        let before = keys.len();
        keys.sort();
        keys.dedup();
        prop_assert_eq!(keys.len(), before);
    }

    #[test]
    fn scores_stay_in_bounds(
        findings in arb_findings(),
        difficulty in arb_weights(&["code_complexity", "blast_radius", "test_coverage_gap", "tooling_fixability"]),
        value in arb_weights(&["severity", "security_impact", "reliability_perf", "developer_experience", "user_value"]),
    ) {
        let config = ScoringConfig {
            difficulty_weights: difficulty,
            value_weights: value,
            ..ScoringConfig::default()
        };
        let scorer = Scorer::new(&config);
        for item in scorer.score_all(findings) {
            prop_assert!((1..=5).contains(&item.difficulty));
            prop_assert!((1..=5).contains(&item.value));
            prop_assert!(item.estimated_hours >= 0.0);
        }
    }

    #[test]
    fn every_item_lands_in_exactly_one_phase(findings in arb_findings()) {
        let config = ScoringConfig::default();
        let items = Scorer::new(&config).score_all(normalize(findings, None));
        let plan = consolidate(&items, &PhaseConfig::default());

        prop_assert_eq!(plan.phases.len(), 5);
        let total: usize = plan.phases.iter().map(|g| g.items.len()).sum();
        prop_assert_eq!(total, items.len());
        for item in &items {
            let homes = plan
                .phases
                .iter()
                .filter(|g| g.items.iter().any(|p| p.item.finding.key() == item.finding.key()))
                .count();
            prop_assert_eq!(homes, 1);
        }
    }

    #[test]
    fn empty_delta_leaves_prior_unchanged(findings in arb_findings()) {
        let config = ScoringConfig::default();
        let prior = normalize_scored(Scorer::new(&config).score_all(normalize(findings, None)));
        let outcome = merge(&prior, &[], &DiffScope::default());
        prop_assert!(outcome.added.is_empty());
        prop_assert_eq!(outcome.merged, prior);
    }

    #[test]
    fn scored_output_is_byte_identical(findings in arb_findings()) {
        let config = ScoringConfig::default();
        let scorer = Scorer::new(&config);
        let a = scorer.score_all(normalize(findings.clone(), None));
        let mut reversed = findings;
        reversed.reverse();
        let b = scorer.score_all(normalize(reversed, None));
        prop_assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
    }
}
