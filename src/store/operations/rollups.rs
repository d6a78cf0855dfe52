use serde::{Deserialize, Serialize};

use crate::engine::types::Timeframe;
use crate::store::keys;
use crate::store::{Store, StoreError};

/// Pre-aggregated latency statistics for one (project, target) time bucket.
/// Upserted by bucket key: recomputing an unchanged bucket yields an
/// identical record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfRollup {
    pub project: String,
    pub target: String,
    pub timeframe: Timeframe,
    /// Bucket start, epoch seconds, aligned to the timeframe grain.
    pub bucket_start: i64,
    pub request_count: u64,
    pub error_count: u64,
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl Store {
    pub fn upsert_rollup(&self, rollup: &PerfRollup) -> Result<(), StoreError> {
        let key = keys::rollup_key(
            &rollup.project,
            &rollup.target,
            rollup.timeframe.as_str(),
            rollup.bucket_start,
        );
        self.rollups.insert(key.as_bytes(), Self::serialize(rollup)?)?;
        Ok(())
    }

    pub fn get_rollup(
        &self,
        project: &str,
        target: &str,
        timeframe: Timeframe,
        bucket_start: i64,
    ) -> Result<Option<PerfRollup>, StoreError> {
        let key = keys::rollup_key(project, target, timeframe.as_str(), bucket_start);
        match self.rollups.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Rollups for one (project, target, timeframe) with
    /// `from <= bucket_start < to`, in ascending bucket order.
    pub fn rollups_in_range(
        &self,
        project: &str,
        target: &str,
        timeframe: Timeframe,
        from: i64,
        to: i64,
    ) -> Result<Vec<PerfRollup>, StoreError> {
        let start = keys::rollup_key(project, target, timeframe.as_str(), from);
        let end = keys::rollup_key(project, target, timeframe.as_str(), to);
        let mut rollups = Vec::new();
        for item in self.rollups.range(start.into_bytes()..end.into_bytes()) {
            let (_, value) = item?;
            rollups.push(Self::deserialize::<PerfRollup>(&value)?);
        }
        Ok(rollups)
    }

    /// Every rollup of one timeframe with `from <= bucket_start < to`,
    /// regardless of project or target. Used to derive coarser grains and to
    /// enumerate targets for incident evaluation.
    pub fn rollups_for_timeframe(
        &self,
        timeframe: Timeframe,
        from: i64,
        to: i64,
    ) -> Result<Vec<PerfRollup>, StoreError> {
        let mut rollups = Vec::new();
        for item in self.rollups.iter() {
            let (_, value) = item?;
            let rollup: PerfRollup = Self::deserialize(&value)?;
            if rollup.timeframe == timeframe
                && rollup.bucket_start >= from
                && rollup.bucket_start < to
            {
                rollups.push(rollup);
            }
        }
        rollups.sort_by_key(|r| r.bucket_start);
        Ok(rollups)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn rollup(target: &str, timeframe: Timeframe, bucket_start: i64, count: u64) -> PerfRollup {
        PerfRollup {
            project: "p1".to_string(),
            target: target.to_string(),
            timeframe,
            bucket_start,
            request_count: count,
            error_count: 0,
            mean_ms: 100.0,
            min_ms: 50.0,
            max_ms: 200.0,
            p50_ms: 90.0,
            p95_ms: 180.0,
            p99_ms: 195.0,
        }
    }

    #[test]
    fn upsert_overwrites_instead_of_accumulating() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("rollups").to_str().unwrap()).unwrap();

        store
            .upsert_rollup(&rollup("GET /x", Timeframe::Minute, 60, 5))
            .unwrap();
        store
            .upsert_rollup(&rollup("GET /x", Timeframe::Minute, 60, 5))
            .unwrap();

        let list = store
            .rollups_in_range("p1", "GET /x", Timeframe::Minute, 0, 1000)
            .unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].request_count, 5);
    }

    #[test]
    fn range_is_half_open_and_ordered() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("rollups-range").to_str().unwrap()).unwrap();

        for bucket in [60, 120, 180] {
            store
                .upsert_rollup(&rollup("GET /x", Timeframe::Minute, bucket, 1))
                .unwrap();
        }

        let list = store
            .rollups_in_range("p1", "GET /x", Timeframe::Minute, 60, 180)
            .unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].bucket_start, 60);
        assert_eq!(list[1].bucket_start, 120);
    }

    #[test]
    fn timeframe_scan_filters_grain() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("rollups-tf").to_str().unwrap()).unwrap();

        store
            .upsert_rollup(&rollup("GET /x", Timeframe::Minute, 60, 1))
            .unwrap();
        store
            .upsert_rollup(&rollup("GET /y", Timeframe::Minute, 120, 1))
            .unwrap();
        store
            .upsert_rollup(&rollup("GET /x", Timeframe::Hour, 0, 2))
            .unwrap();

        let minutes = store
            .rollups_for_timeframe(Timeframe::Minute, 0, 1000)
            .unwrap();
        assert_eq!(minutes.len(), 2);

        let hours = store.rollups_for_timeframe(Timeframe::Hour, 0, 1000).unwrap();
        assert_eq!(hours.len(), 1);
        assert_eq!(hours[0].request_count, 2);
    }
}
