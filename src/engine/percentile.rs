/// Nearest-rank percentile over an already sorted slice.
///
/// The rank rounds to the nearest position with ties toward the lower rank,
/// so a p50 over ten samples selects the fifth value and a p95 the ninth.
/// The index is clamped to the valid range.
pub fn nearest_rank(sorted: &[f64], percentile: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let n = sorted.len();
    let rank = (percentile * n as f64 - 0.5).ceil().max(1.0) as usize;
    let index = (rank - 1).min(n - 1);
    Some(sorted[index])
}

/// Count / mean / min / max / p50 / p95 / p99 for one bucket of durations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketStats {
    pub count: u64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

pub fn bucket_stats(durations: &mut Vec<f64>) -> Option<BucketStats> {
    if durations.is_empty() {
        return None;
    }
    durations.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let count = durations.len() as u64;
    let sum: f64 = durations.iter().sum();

    Some(BucketStats {
        count,
        mean: sum / count as f64,
        min: durations[0],
        max: durations[durations.len() - 1],
        p50: nearest_rank(durations, 0.50)?,
        p95: nearest_rank(durations, 0.95)?,
        p99: nearest_rank(durations, 0.99)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_rank_matches_reference_vector() {
        let sorted = [
            100.0, 100.0, 200.0, 300.0, 300.0, 300.0, 500.0, 900.0, 900.0, 1000.0,
        ];
        assert_eq!(nearest_rank(&sorted, 0.50), Some(300.0));
        assert_eq!(nearest_rank(&sorted, 0.95), Some(900.0));
        assert_eq!(nearest_rank(&sorted, 0.99), Some(1000.0));
    }

    #[test]
    fn nearest_rank_small_inputs() {
        assert_eq!(nearest_rank(&[], 0.5), None);
        assert_eq!(nearest_rank(&[42.0], 0.5), Some(42.0));
        assert_eq!(nearest_rank(&[42.0], 0.99), Some(42.0));
        assert_eq!(nearest_rank(&[1.0, 2.0], 0.5), Some(1.0));
        assert_eq!(nearest_rank(&[1.0, 2.0], 0.95), Some(2.0));
    }

    #[test]
    fn nearest_rank_clamps_out_of_range() {
        let sorted = [1.0, 2.0, 3.0];
        assert_eq!(nearest_rank(&sorted, 0.0), Some(1.0));
        assert_eq!(nearest_rank(&sorted, 1.0), Some(3.0));
    }

    #[test]
    fn bucket_stats_computes_all_fields() {
        let mut durations = vec![
            300.0, 100.0, 900.0, 200.0, 300.0, 500.0, 100.0, 900.0, 300.0, 1000.0,
        ];
        let stats = bucket_stats(&mut durations).unwrap();
        assert_eq!(stats.count, 10);
        assert_eq!(stats.min, 100.0);
        assert_eq!(stats.max, 1000.0);
        assert_eq!(stats.p50, 300.0);
        assert_eq!(stats.p95, 900.0);
        assert!((stats.mean - 460.0).abs() < 1e-9);
    }

    #[test]
    fn bucket_stats_empty_is_none() {
        assert_eq!(bucket_stats(&mut Vec::new()), None);
    }
}
