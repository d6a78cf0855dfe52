use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

/// One raw latency sample, keyed by occurrence time so rollup buckets are a
/// contiguous range scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfEvent {
    pub id: String,
    pub project: String,
    pub target: String,
    pub duration_ms: f64,
    pub error: bool,
    pub occurred_at: DateTime<Utc>,
}

impl Store {
    pub fn create_perf_event(&self, event: &PerfEvent) -> Result<(), StoreError> {
        let key = keys::perf_event_key(event.occurred_at.timestamp_millis(), &event.id);
        self.perf_events
            .insert(key.as_bytes(), Self::serialize(event)?)?;
        Ok(())
    }

    /// All raw samples with `start_ms <= occurred_at < end_ms`, across every
    /// project and target. The rollup worker groups them afterwards.
    pub fn perf_events_in_range(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<PerfEvent>, StoreError> {
        let start = keys::time_range_start(start_ms).into_bytes();
        let end = keys::time_range_start(end_ms).into_bytes();
        let mut events = Vec::new();
        for item in self.perf_events.range(start..end) {
            let (_, value) = item?;
            events.push(Self::deserialize::<PerfEvent>(&value)?);
        }
        Ok(events)
    }

    pub fn prune_perf_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let end = keys::time_range_start(cutoff.timestamp_millis());
        let mut removed = 0u64;
        for item in self.perf_events.range(..end.into_bytes()) {
            let (key, _) = item?;
            self.perf_events.remove(&key)?;
            removed += 1;
        }
        Ok(removed)
    }
}
