//! Property-based integration tests for source bookkeeping and periods.
//!
//! These tests drive the public registry API with random outcome sequences
//! and check the invariants callers rely on.

use chrono::Utc;
use proptest::prelude::*;
use tufe_core::models::{HealthStatus, NewSource, Period, Source, NEUTRAL_RELIABILITY};
use tufe_core::registry::{HealthPolicy, SourceRegistry};

// =============================================================================
// Generators
// =============================================================================

fn new_source(id: &str, priority: u8) -> NewSource {
    NewSource {
        id: Some(id.to_string()),
        provider_id: "TCMB_EVDS".to_string(),
        name: format!("Source {}", id),
        endpoint: String::new(),
        series_code: "TP.FG.J0".to_string(),
        format: Default::default(),
        auth: Default::default(),
        rate_budget: Default::default(),
        priority,
    }
}

/// Outcome of one call: `Some(latency)` for success, `None` for failure.
fn arb_outcomes(max: usize) -> impl Strategy<Value = Vec<Option<u64>>> {
    proptest::collection::vec(proptest::option::of(1u64..5_000), 0..=max)
}

fn registry_with(ids: &[(String, u8)]) -> SourceRegistry {
    let registry = SourceRegistry::with_policy(HealthPolicy::default());
    for (id, priority) in ids {
        let source = Source::new(new_source(id, *priority), Utc::now()).unwrap();
        registry.add(source).unwrap();
    }
    registry
}

fn replay(registry: &SourceRegistry, id: &str, outcomes: &[Option<u64>]) -> Source {
    let mut last = registry.get_by_id(id).unwrap();
    for outcome in outcomes {
        last = match outcome {
            Some(ms) => registry.record_success(id, *ms, Utc::now()).unwrap(),
            None => registry.record_failure(id, "boom", Utc::now()).unwrap(),
        };
    }
    last
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// **Property 1: Counters match the recorded outcomes**
    ///
    /// Success and failure counts equal the number of each outcome and the
    /// reliability score is their ratio, or neutral with no outcomes.
    #[test]
    fn prop_counters_match_outcomes(outcomes in arb_outcomes(60)) {
        let registry = registry_with(&[("evds".to_string(), 1)]);
        let source = replay(&registry, "evds", &outcomes);

        let successes = outcomes.iter().filter(|o| o.is_some()).count() as u64;
        let failures = outcomes.len() as u64 - successes;
        prop_assert_eq!(source.success_count, successes);
        prop_assert_eq!(source.failure_count, failures);
        prop_assert!((0.0..=1.0).contains(&source.reliability_score));
        if outcomes.is_empty() {
            prop_assert_eq!(source.reliability_score, NEUTRAL_RELIABILITY);
            prop_assert_eq!(source.health_status, HealthStatus::Unknown);
        } else {
            let expected = successes as f64 / outcomes.len() as f64;
            prop_assert!((source.reliability_score - expected).abs() < 1e-9);
        }
    }

    /// **Property 2: Average latency stays within the observed range**
    #[test]
    fn prop_average_latency_is_bounded(outcomes in arb_outcomes(60)) {
        let registry = registry_with(&[("evds".to_string(), 1)]);
        let source = replay(&registry, "evds", &outcomes);

        let latencies: Vec<u64> = outcomes.iter().flatten().copied().collect();
        if latencies.is_empty() {
            prop_assert_eq!(source.avg_response_time_ms, 0.0);
        } else {
            let min = *latencies.iter().min().unwrap() as f64;
            let max = *latencies.iter().max().unwrap() as f64;
            prop_assert!(source.avg_response_time_ms >= min - 1e-6);
            prop_assert!(source.avg_response_time_ms <= max + 1e-6);
        }
    }

    /// **Property 3: Failure threshold always ends in `failed`**
    ///
    /// Whatever came before, three consecutive failures leave the source
    /// failed and two consecutive successes leave it healthy.
    #[test]
    fn prop_streak_thresholds_decide_status(prefix in arb_outcomes(30)) {
        let registry = registry_with(&[("evds".to_string(), 1)]);
        replay(&registry, "evds", &prefix);

        let failed = replay(&registry, "evds", &[None, None, None]);
        prop_assert_eq!(failed.health_status, HealthStatus::Failed);

        let healthy = replay(&registry, "evds", &[Some(10), Some(10)]);
        prop_assert_eq!(healthy.health_status, HealthStatus::Healthy);
    }

    /// **Property 4: Rotation restores a fresh record**
    #[test]
    fn prop_rotation_resets_bookkeeping(outcomes in arb_outcomes(40)) {
        let registry = registry_with(&[("evds".to_string(), 1)]);
        replay(&registry, "evds", &outcomes);

        let rotated = registry.rotate_counters("evds", Utc::now()).unwrap();
        prop_assert_eq!(rotated.success_count, 0);
        prop_assert_eq!(rotated.failure_count, 0);
        prop_assert_eq!(rotated.avg_response_time_ms, 0.0);
        prop_assert_eq!(rotated.reliability_score, NEUTRAL_RELIABILITY);
        prop_assert_eq!(rotated.health_status, HealthStatus::Unknown);
    }

    /// **Property 5: Ranking is ordered by priority first**
    #[test]
    fn prop_ranking_orders_by_priority(
        priorities in proptest::collection::vec(0u8..=10, 1..12),
        outcomes in arb_outcomes(20),
    ) {
        let ids: Vec<(String, u8)> = priorities
            .iter()
            .enumerate()
            .map(|(i, p)| (format!("s{}", i), *p))
            .collect();
        let registry = registry_with(&ids);
        replay(&registry, "s0", &outcomes);

        let mut ranked = registry.get_active();
        ranked.sort_by(|a, b| a.rank_cmp(b));
        for pair in ranked.windows(2) {
            prop_assert!(pair[0].priority <= pair[1].priority);
            if pair[0].priority == pair[1].priority {
                prop_assert!(pair[0].reliability_score >= pair[1].reliability_score);
            }
        }
    }

    /// **Property 6: Period keys parse back to the same period**
    #[test]
    fn prop_period_key_is_canonical(year in 1900i32..=2200, month in proptest::option::of(1u32..=12)) {
        let period = Period::new(year, month).unwrap();
        let parsed: Period = period.key().parse().unwrap();
        prop_assert_eq!(parsed, period);
        prop_assert_eq!(parsed.is_monthly(), month.is_some());
    }

    /// **Property 7: Out-of-range months are rejected**
    #[test]
    fn prop_invalid_months_rejected(year in 1900i32..=2200, month in 13u32..100) {
        prop_assert!(Period::monthly(year, month).is_err());
        prop_assert!(Period::monthly(year, 0).is_err());
    }
}
