use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::engine::types::QueryObservation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateSeverity {
    Low,
    Medium,
    High,
}

/// One query shape repeated suspiciously often within a single unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NPlusOneCandidate {
    pub normalized: String,
    pub repetitions: usize,
    pub mean_duration_ms: f64,
    pub total_duration_ms: f64,
    pub severity: CandidateSeverity,
}

/// Cluster the queries observed in one request by normalized shape and flag
/// shapes repeated at or above `threshold`. Purely in-memory; historical
/// frequency is a separate classifier on the stored SQL fingerprint.
pub fn detect(queries: &[QueryObservation], threshold: usize) -> Vec<NPlusOneCandidate> {
    if threshold == 0 || queries.is_empty() {
        return Vec::new();
    }

    let mut groups: HashMap<&str, (usize, f64)> = HashMap::new();
    for q in queries {
        let entry = groups.entry(q.normalized.as_str()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += q.duration_ms;
    }

    let mut candidates: Vec<NPlusOneCandidate> = groups
        .into_iter()
        .filter(|(_, (reps, _))| *reps >= threshold)
        .map(|(normalized, (repetitions, total_duration_ms))| {
            let mean_duration_ms = total_duration_ms / repetitions as f64;
            NPlusOneCandidate {
                normalized: normalized.to_string(),
                repetitions,
                mean_duration_ms,
                total_duration_ms,
                severity: severity_for(repetitions, threshold, total_duration_ms),
            }
        })
        .collect();

    // Worst offenders first: most repetitions, then most total time.
    candidates.sort_by(|a, b| {
        b.repetitions
            .cmp(&a.repetitions)
            .then(b.total_duration_ms.total_cmp(&a.total_duration_ms))
    });
    candidates
}

/// Severity scales with how far past the threshold the burst went and how
/// much wall time the repeated shape cost in aggregate.
fn severity_for(repetitions: usize, threshold: usize, total_duration_ms: f64) -> CandidateSeverity {
    if repetitions >= threshold * 4 || total_duration_ms >= 1000.0 {
        CandidateSeverity::High
    } else if repetitions >= threshold * 2 || total_duration_ms >= 250.0 {
        CandidateSeverity::Medium
    } else {
        CandidateSeverity::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(normalized: &str, duration_ms: f64) -> QueryObservation {
        QueryObservation {
            normalized: normalized.to_string(),
            duration_ms,
        }
    }

    fn repeated(normalized: &str, n: usize, duration_ms: f64) -> Vec<QueryObservation> {
        (0..n).map(|_| q(normalized, duration_ms)).collect()
    }

    #[test]
    fn six_repetitions_are_flagged_four_are_not() {
        let mut queries = repeated("SELECT * FROM orders WHERE id = ?", 6, 2.0);
        queries.extend(repeated("SELECT * FROM users WHERE id = ?", 4, 2.0));

        let candidates = detect(&queries, 5);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].repetitions, 6);
        assert_eq!(
            candidates[0].normalized,
            "SELECT * FROM orders WHERE id = ?"
        );
    }

    #[test]
    fn exact_threshold_counts() {
        let queries = repeated("SELECT 1", 5, 1.0);
        assert_eq!(detect(&queries, 5).len(), 1);
    }

    #[test]
    fn mean_and_total_duration_are_reported() {
        let queries = repeated("SELECT 1", 6, 3.0);
        let candidates = detect(&queries, 5);
        assert!((candidates[0].mean_duration_ms - 3.0).abs() < 1e-9);
        assert!((candidates[0].total_duration_ms - 18.0).abs() < 1e-9);
    }

    #[test]
    fn severity_scales_with_repetitions_and_cost() {
        let low = detect(&repeated("a", 6, 1.0), 5);
        assert_eq!(low[0].severity, CandidateSeverity::Low);

        let medium = detect(&repeated("b", 10, 1.0), 5);
        assert_eq!(medium[0].severity, CandidateSeverity::Medium);

        let high_reps = detect(&repeated("c", 20, 1.0), 5);
        assert_eq!(high_reps[0].severity, CandidateSeverity::High);

        let high_cost = detect(&repeated("d", 6, 200.0), 5);
        assert_eq!(high_cost[0].severity, CandidateSeverity::High);
    }

    #[test]
    fn candidates_sorted_worst_first() {
        let mut queries = repeated("five", 5, 1.0);
        queries.extend(repeated("nine", 9, 1.0));
        let candidates = detect(&queries, 5);
        assert_eq!(candidates[0].normalized, "nine");
        assert_eq!(candidates[1].normalized, "five");
    }

    #[test]
    fn zero_threshold_disables_detection() {
        let queries = repeated("a", 10, 1.0);
        assert!(detect(&queries, 0).is_empty());
    }
}
