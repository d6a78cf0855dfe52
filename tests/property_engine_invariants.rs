use proptest::prelude::*;

use monitor_backend::engine::fingerprint::{normalize_origin, Fingerprinter};
use monitor_backend::engine::nplusone;
use monitor_backend::engine::percentile::{bucket_stats, nearest_rank};
use monitor_backend::engine::types::QueryObservation;

proptest! {
    #[test]
    fn pt_fingerprint_ignores_line_numbers(
        kind in "[A-Za-z]{1,16}",
        file in "[a-z/_]{1,24}\\.rb",
        line_a in 1u32..10_000,
        line_b in 1u32..10_000,
        call_path in "[A-Za-z#]{1,24}",
    ) {
        let fp = Fingerprinter::new(&[]);
        let a = fp.fingerprint(&kind, &format!("{file}:{line_a}"), &call_path);
        let b = fp.fingerprint(&kind, &format!("{file}:{line_b}"), &call_path);
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.len(), 64);
        prop_assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn pt_normalize_origin_never_panics(origin in ".{0,64}") {
        let normalized = normalize_origin(&origin);
        prop_assert!(origin.starts_with(normalized));
    }

    #[test]
    fn pt_nearest_rank_picks_an_element_within_bounds(
        mut values in prop::collection::vec(0.0f64..10_000.0, 1..200),
        percentile in 0.01f64..1.0,
    ) {
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let picked = nearest_rank(&values, percentile).unwrap();
        prop_assert!(values.contains(&picked));
        prop_assert!(picked >= values[0]);
        prop_assert!(picked <= values[values.len() - 1]);
    }

    #[test]
    fn pt_bucket_stats_percentiles_are_ordered(
        values in prop::collection::vec(0.0f64..10_000.0, 1..200),
    ) {
        let mut durations = values;
        let stats = bucket_stats(&mut durations).unwrap();
        prop_assert!(stats.min <= stats.p50);
        prop_assert!(stats.p50 <= stats.p95);
        prop_assert!(stats.p95 <= stats.p99);
        prop_assert!(stats.p99 <= stats.max);
        prop_assert!(stats.mean >= stats.min && stats.mean <= stats.max);
        prop_assert_eq!(stats.count as usize, durations.len());
    }

    #[test]
    fn pt_detect_respects_threshold(
        repetitions in 1usize..20,
        threshold in 1usize..20,
    ) {
        let queries: Vec<QueryObservation> = (0..repetitions)
            .map(|_| QueryObservation {
                normalized: "SELECT * FROM t WHERE id = ?".to_string(),
                duration_ms: 1.0,
            })
            .collect();
        let candidates = nplusone::detect(&queries, threshold);
        if repetitions >= threshold {
            prop_assert_eq!(candidates.len(), 1);
            prop_assert_eq!(candidates[0].repetitions, repetitions);
        } else {
            prop_assert!(candidates.is_empty());
        }
    }
}
