//! Percentile rollup workers. The minute grain is computed from raw
//! samples; hour and day are re-aggregated from the next finer grain.
//! Every write is an upsert keyed by bucket, so re-running a bucket with
//! unchanged inputs produces an identical record.

use std::collections::HashMap;

use chrono::Utc;

use crate::engine::percentile::bucket_stats;
use crate::engine::types::Timeframe;
use crate::store::operations::rollups::PerfRollup;
use crate::store::{Store, StoreError};

/// Aggregate one closed minute bucket from raw samples. Returns the number
/// of (project, target) rollups written.
pub fn rollup_minute_bucket(store: &Store, bucket_start: i64) -> Result<usize, StoreError> {
    let start_ms = bucket_start * 1000;
    let end_ms = (bucket_start + Timeframe::Minute.bucket_secs()) * 1000;
    let events = store.perf_events_in_range(start_ms, end_ms)?;

    let mut groups: HashMap<(String, String), (Vec<f64>, u64)> = HashMap::new();
    for event in events {
        let entry = groups
            .entry((event.project, event.target))
            .or_insert_with(|| (Vec::new(), 0));
        entry.0.push(event.duration_ms);
        if event.error {
            entry.1 += 1;
        }
    }

    let mut written = 0usize;
    for ((project, target), (mut durations, error_count)) in groups {
        let Some(stats) = bucket_stats(&mut durations) else {
            continue;
        };
        store.upsert_rollup(&PerfRollup {
            project,
            target,
            timeframe: Timeframe::Minute,
            bucket_start,
            request_count: stats.count,
            error_count,
            mean_ms: stats.mean,
            min_ms: stats.min,
            max_ms: stats.max,
            p50_ms: stats.p50,
            p95_ms: stats.p95,
            p99_ms: stats.p99,
        })?;
        written += 1;
    }
    Ok(written)
}

/// Aggregate one hour or day bucket from the next finer grain. Percentiles
/// of percentiles cannot be exact; the coarse value is the count-weighted
/// mean of the finer buckets' percentiles.
pub fn rollup_coarse_bucket(
    store: &Store,
    timeframe: Timeframe,
    bucket_start: i64,
) -> Result<usize, StoreError> {
    let Some(finer) = timeframe.finer() else {
        return Ok(0);
    };
    let finer_rollups = store.rollups_for_timeframe(
        finer,
        bucket_start,
        bucket_start + timeframe.bucket_secs(),
    )?;

    let mut groups: HashMap<(String, String), Vec<PerfRollup>> = HashMap::new();
    for rollup in finer_rollups {
        groups
            .entry((rollup.project.clone(), rollup.target.clone()))
            .or_default()
            .push(rollup);
    }

    let mut written = 0usize;
    for ((project, target), parts) in groups {
        let request_count: u64 = parts.iter().map(|p| p.request_count).sum();
        if request_count == 0 {
            continue;
        }
        let error_count: u64 = parts.iter().map(|p| p.error_count).sum();
        let total = request_count as f64;
        let weighted = |f: fn(&PerfRollup) -> f64| -> f64 {
            parts
                .iter()
                .map(|p| f(p) * p.request_count as f64)
                .sum::<f64>()
                / total
        };

        store.upsert_rollup(&PerfRollup {
            project,
            target,
            timeframe,
            bucket_start,
            request_count,
            error_count,
            mean_ms: weighted(|p| p.mean_ms),
            min_ms: parts.iter().map(|p| p.min_ms).fold(f64::INFINITY, f64::min),
            max_ms: parts
                .iter()
                .map(|p| p.max_ms)
                .fold(f64::NEG_INFINITY, f64::max),
            p50_ms: weighted(|p| p.p50_ms),
            p95_ms: weighted(|p| p.p95_ms),
            p99_ms: weighted(|p| p.p99_ms),
        })?;
        written += 1;
    }
    Ok(written)
}

/// Recompute a timeframe's previous and current bucket. The previous
/// bucket catches samples that arrived after its boundary passed.
fn run_timeframe(store: &Store, timeframe: Timeframe) {
    let current = timeframe.bucket_start(Utc::now());
    let previous = current - timeframe.bucket_secs();

    for bucket_start in [previous, current] {
        let result = match timeframe {
            Timeframe::Minute => rollup_minute_bucket(store, bucket_start),
            _ => rollup_coarse_bucket(store, timeframe, bucket_start),
        };
        match result {
            Ok(written) if written > 0 => {
                tracing::debug!(
                    timeframe = timeframe.as_str(),
                    bucket_start,
                    written,
                    "Rollup bucket aggregated"
                );
            }
            Ok(_) => {}
            Err(err) => {
                tracing::error!(
                    timeframe = timeframe.as_str(),
                    bucket_start,
                    error = %err,
                    "Rollup aggregation failed"
                );
            }
        }
    }
}

pub async fn run_minute(store: &Store) {
    run_timeframe(store, Timeframe::Minute);
}

pub async fn run_hour(store: &Store) {
    run_timeframe(store, Timeframe::Hour);
}

pub async fn run_day(store: &Store) {
    run_timeframe(store, Timeframe::Day);
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono::Utc;
    use tempfile::tempdir;

    use crate::store::operations::perf_events::PerfEvent;

    use super::*;

    fn open_store(name: &str) -> (tempfile::TempDir, Store) {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join(name).to_str().unwrap()).unwrap();
        (dir, store)
    }

    fn seed_minute(store: &Store, bucket_start: i64, target: &str, durations: &[f64]) {
        for (i, d) in durations.iter().enumerate() {
            let at = Utc
                .timestamp_opt(bucket_start + (i as i64 % 60), 0)
                .unwrap();
            store
                .create_perf_event(&PerfEvent {
                    id: format!("{target}-{bucket_start}-{i}"),
                    project: "p1".to_string(),
                    target: target.to_string(),
                    duration_ms: *d,
                    error: i % 10 == 0,
                    occurred_at: at,
                })
                .unwrap();
        }
    }

    #[test]
    fn minute_rollup_matches_reference_percentiles() {
        let (_dir, store) = open_store("rollup-min");
        let bucket = 1_700_000_040; // minute aligned
        let durations = [
            100.0, 200.0, 300.0, 400.0, 500.0, 600.0, 700.0, 800.0, 900.0, 1000.0,
        ];
        seed_minute(&store, bucket, "GET /orders", &durations);

        let written = rollup_minute_bucket(&store, bucket).unwrap();
        assert_eq!(written, 1);

        let rollup = store
            .get_rollup("p1", "GET /orders", Timeframe::Minute, bucket)
            .unwrap()
            .unwrap();
        assert_eq!(rollup.request_count, 10);
        assert_eq!(rollup.error_count, 1);
        assert_eq!(rollup.p50_ms, 300.0);
        assert_eq!(rollup.p95_ms, 900.0);
        assert_eq!(rollup.p99_ms, 1000.0);
        assert_eq!(rollup.min_ms, 100.0);
        assert_eq!(rollup.max_ms, 1000.0);
    }

    #[test]
    fn minute_rollup_is_idempotent() {
        let (_dir, store) = open_store("rollup-idem");
        let bucket = 1_700_000_040;
        seed_minute(&store, bucket, "GET /orders", &[50.0, 150.0, 250.0]);

        rollup_minute_bucket(&store, bucket).unwrap();
        let first = store
            .get_rollup("p1", "GET /orders", Timeframe::Minute, bucket)
            .unwrap()
            .unwrap();

        rollup_minute_bucket(&store, bucket).unwrap();
        let second = store
            .get_rollup("p1", "GET /orders", Timeframe::Minute, bucket)
            .unwrap()
            .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn empty_bucket_writes_nothing() {
        let (_dir, store) = open_store("rollup-empty");
        assert_eq!(rollup_minute_bucket(&store, 1_700_000_040).unwrap(), 0);
    }

    #[test]
    fn targets_aggregate_separately() {
        let (_dir, store) = open_store("rollup-targets");
        let bucket = 1_700_000_040;
        seed_minute(&store, bucket, "GET /a", &[10.0, 20.0]);
        seed_minute(&store, bucket, "GET /b", &[30.0]);

        assert_eq!(rollup_minute_bucket(&store, bucket).unwrap(), 2);
        let a = store
            .get_rollup("p1", "GET /a", Timeframe::Minute, bucket)
            .unwrap()
            .unwrap();
        assert_eq!(a.request_count, 2);
        let b = store
            .get_rollup("p1", "GET /b", Timeframe::Minute, bucket)
            .unwrap()
            .unwrap();
        assert_eq!(b.request_count, 1);
    }

    #[test]
    fn hour_rollup_weights_by_request_count() {
        let (_dir, store) = open_store("rollup-hour");
        let hour = 1_699_999_200; // hour aligned
        let base = PerfRollup {
            project: "p1".to_string(),
            target: "GET /orders".to_string(),
            timeframe: Timeframe::Minute,
            bucket_start: hour,
            request_count: 30,
            error_count: 3,
            mean_ms: 100.0,
            min_ms: 10.0,
            max_ms: 200.0,
            p50_ms: 100.0,
            p95_ms: 180.0,
            p99_ms: 195.0,
        };
        store.upsert_rollup(&base).unwrap();
        let mut heavier = base.clone();
        heavier.bucket_start = hour + 60;
        heavier.request_count = 90;
        heavier.error_count = 0;
        heavier.mean_ms = 300.0;
        heavier.min_ms = 5.0;
        heavier.max_ms = 900.0;
        heavier.p50_ms = 300.0;
        heavier.p95_ms = 600.0;
        heavier.p99_ms = 800.0;
        store.upsert_rollup(&heavier).unwrap();

        assert_eq!(
            rollup_coarse_bucket(&store, Timeframe::Hour, hour).unwrap(),
            1
        );
        let rollup = store
            .get_rollup("p1", "GET /orders", Timeframe::Hour, hour)
            .unwrap()
            .unwrap();
        assert_eq!(rollup.request_count, 120);
        assert_eq!(rollup.error_count, 3);
        assert_eq!(rollup.min_ms, 5.0);
        assert_eq!(rollup.max_ms, 900.0);
        // (100*30 + 300*90) / 120
        assert_eq!(rollup.mean_ms, 250.0);
        // (180*30 + 600*90) / 120
        assert_eq!(rollup.p95_ms, 495.0);
    }

    #[test]
    fn coarse_bucket_with_no_finer_data_writes_nothing() {
        let (_dir, store) = open_store("rollup-hour-empty");
        assert_eq!(
            rollup_coarse_bucket(&store, Timeframe::Hour, 1_699_999_200).unwrap(),
            0
        );
    }
}
