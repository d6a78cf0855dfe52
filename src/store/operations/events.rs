use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::types::StackFrame;
use crate::store::keys;
use crate::store::{Store, StoreError};

/// An immutable raw error occurrence, kept for inspection until retention
/// removes it. Belongs to exactly one issue via its fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    pub id: String,
    pub project: String,
    pub fingerprint: String,
    pub kind: String,
    pub message: String,
    pub frames: Vec<StackFrame>,
    pub call_path: String,
    pub occurred_at: DateTime<Utc>,
}

impl Store {
    pub fn create_event(&self, event: &ErrorEvent) -> Result<(), StoreError> {
        let ts = event.occurred_at.timestamp_millis();
        let key = keys::event_key(&event.project, &event.fingerprint, ts, &event.id);
        self.events.insert(key.as_bytes(), Self::serialize(event)?)?;
        // Time index for retention pruning; value points back at the primary key.
        let time_key = keys::event_time_index_key(ts, &event.id);
        self.events_by_time
            .insert(time_key.as_bytes(), key.as_bytes())?;
        Ok(())
    }

    /// Most recent events for one issue, newest first.
    pub fn get_issue_events(
        &self,
        project: &str,
        fingerprint: &str,
        limit: usize,
    ) -> Result<Vec<ErrorEvent>, StoreError> {
        let prefix = keys::event_prefix(project, fingerprint);
        let mut events = Vec::new();
        for item in self.events.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item?;
            events.push(Self::deserialize::<ErrorEvent>(&value)?);
            if events.len() >= limit {
                break;
            }
        }
        Ok(events)
    }

    /// Number of events attributed to one issue since `since`. Event keys
    /// sort newest-first within the issue prefix, so the scan stops at the
    /// first event older than the window.
    pub fn count_issue_events_since(
        &self,
        project: &str,
        fingerprint: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let prefix = keys::event_prefix(project, fingerprint);
        let mut count = 0u64;
        for item in self.events.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item?;
            let event: ErrorEvent = Self::deserialize(&value)?;
            if event.occurred_at < since {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    /// Remove raw error events older than `cutoff`. Issues and their counters
    /// are untouched; only the raw occurrence data ages out.
    pub fn prune_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let end = keys::time_range_start(cutoff.timestamp_millis());
        let mut removed = 0u64;
        for item in self.events_by_time.range(..end.into_bytes()) {
            let (time_key, primary_key) = item?;
            self.events.remove(&primary_key)?;
            self.events_by_time.remove(&time_key)?;
            removed += 1;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tempfile::tempdir;

    use super::*;

    fn event(id: &str, fingerprint: &str, occurred_at: DateTime<Utc>) -> ErrorEvent {
        ErrorEvent {
            id: id.to_string(),
            project: "p1".to_string(),
            fingerprint: fingerprint.to_string(),
            kind: "NoMethodError".to_string(),
            message: "boom".to_string(),
            frames: vec![],
            call_path: "Orders#show".to_string(),
            occurred_at,
        }
    }

    #[test]
    fn issue_events_come_back_newest_first() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("events").to_str().unwrap()).unwrap();

        let now = Utc::now();
        store
            .create_event(&event("e1", "fp", now - Duration::seconds(30)))
            .unwrap();
        store.create_event(&event("e2", "fp", now)).unwrap();

        let list = store.get_issue_events("p1", "fp", 10).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, "e2");
        assert_eq!(list[1].id, "e1");
    }

    #[test]
    fn window_count_excludes_old_events() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("events-window").to_str().unwrap()).unwrap();

        let now = Utc::now();
        store
            .create_event(&event("old", "fp", now - Duration::hours(2)))
            .unwrap();
        store
            .create_event(&event("new1", "fp", now - Duration::minutes(5)))
            .unwrap();
        store.create_event(&event("new2", "fp", now)).unwrap();

        let count = store
            .count_issue_events_since("p1", "fp", now - Duration::hours(1))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn pruning_removes_only_aged_events() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("events-prune").to_str().unwrap()).unwrap();

        let now = Utc::now();
        store
            .create_event(&event("old", "fp", now - Duration::days(40)))
            .unwrap();
        store.create_event(&event("fresh", "fp", now)).unwrap();

        let removed = store
            .prune_events_before(now - Duration::days(30))
            .unwrap();
        assert_eq!(removed, 1);

        let list = store.get_issue_events("p1", "fp", 10).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, "fresh");
    }
}
