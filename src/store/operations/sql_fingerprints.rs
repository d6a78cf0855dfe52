use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::store::keys;
use crate::store::{Store, StoreError, MAX_CAS_ATTEMPTS};

/// Running aggregates for one normalized query shape per (project, call path).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlFingerprint {
    pub project: String,
    pub hash: String,
    pub call_path: String,
    /// Leading SQL verb: select, insert, update, delete or other.
    pub query_kind: String,
    pub normalized: String,
    pub total_count: u64,
    pub total_duration_ms: f64,
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl SqlFingerprint {
    pub fn mean_duration_ms(&self) -> f64 {
        if self.total_count == 0 {
            0.0
        } else {
            self.total_duration_ms / self.total_count as f64
        }
    }

    /// Long-run N+1 classifier: a shape that has run very often and stayed
    /// individually cheap. Independent of the single-request burst detector.
    pub fn is_n_plus_one_candidate(&self, min_count: u64, cheap_ceiling_ms: f64) -> bool {
        self.total_count >= min_count && self.mean_duration_ms() < cheap_ceiling_ms
    }
}

/// Stable key for one query shape within one call path.
pub fn sql_hash(call_path: &str, normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(call_path.as_bytes());
    hasher.update([0]);
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

fn query_kind(normalized: &str) -> String {
    normalized
        .split_whitespace()
        .next()
        .map(|w| w.to_ascii_lowercase())
        .filter(|w| matches!(w.as_str(), "select" | "insert" | "update" | "delete"))
        .unwrap_or_else(|| "other".to_string())
}

impl Store {
    /// Counter upsert with the same compare-and-swap discipline as issues:
    /// concurrent trackers of one shape never lose an increment.
    pub fn track_sql_fingerprint(
        &self,
        project: &str,
        call_path: &str,
        normalized: &str,
        duration_ms: f64,
        observed_at: DateTime<Utc>,
    ) -> Result<SqlFingerprint, StoreError> {
        let hash = sql_hash(call_path, normalized);
        let key = keys::sql_fingerprint_key(project, &hash);

        for _ in 0..MAX_CAS_ATTEMPTS {
            match self.sql_fingerprints.get(key.as_bytes())? {
                None => {
                    let fp = SqlFingerprint {
                        project: project.to_string(),
                        hash: hash.clone(),
                        call_path: call_path.to_string(),
                        query_kind: query_kind(normalized),
                        normalized: normalized.to_string(),
                        total_count: 1,
                        total_duration_ms: duration_ms,
                        min_duration_ms: duration_ms,
                        max_duration_ms: duration_ms,
                        first_seen: observed_at,
                        last_seen: observed_at,
                    };
                    let bytes = Self::serialize(&fp)?;
                    if self
                        .sql_fingerprints
                        .compare_and_swap(key.as_bytes(), None::<&[u8]>, Some(bytes))?
                        .is_ok()
                    {
                        return Ok(fp);
                    }
                }
                Some(old_raw) => {
                    let mut fp: SqlFingerprint = Self::deserialize(&old_raw)?;
                    fp.total_count += 1;
                    fp.total_duration_ms += duration_ms;
                    fp.min_duration_ms = fp.min_duration_ms.min(duration_ms);
                    fp.max_duration_ms = fp.max_duration_ms.max(duration_ms);
                    if observed_at > fp.last_seen {
                        fp.last_seen = observed_at;
                    }
                    let new_bytes = Self::serialize(&fp)?;
                    if self
                        .sql_fingerprints
                        .compare_and_swap(
                            key.as_bytes(),
                            Some(old_raw.as_ref()),
                            Some(new_bytes),
                        )?
                        .is_ok()
                    {
                        return Ok(fp);
                    }
                }
            }
        }

        Err(StoreError::CasRetryExhausted {
            entity: "sql_fingerprint".to_string(),
            key,
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    pub fn list_sql_fingerprints(
        &self,
        project: &str,
        limit: usize,
    ) -> Result<Vec<SqlFingerprint>, StoreError> {
        let prefix = keys::sql_fingerprint_prefix(project);
        let mut fingerprints = Vec::new();
        for item in self.sql_fingerprints.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item?;
            fingerprints.push(Self::deserialize::<SqlFingerprint>(&value)?);
        }
        fingerprints.sort_by(|a, b| b.total_count.cmp(&a.total_count));
        fingerprints.truncate(limit);
        Ok(fingerprints)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn aggregates_accumulate() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("sqlfp").to_str().unwrap()).unwrap();

        let now = Utc::now();
        let q = "SELECT * FROM orders WHERE id = ?";
        store
            .track_sql_fingerprint("p1", "Orders#show", q, 10.0, now)
            .unwrap();
        let fp = store
            .track_sql_fingerprint("p1", "Orders#show", q, 30.0, now)
            .unwrap();

        assert_eq!(fp.total_count, 2);
        assert_eq!(fp.total_duration_ms, 40.0);
        assert_eq!(fp.min_duration_ms, 10.0);
        assert_eq!(fp.max_duration_ms, 30.0);
        assert_eq!(fp.mean_duration_ms(), 20.0);
        assert_eq!(fp.query_kind, "select");
    }

    #[test]
    fn distinct_call_paths_do_not_share_counters() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("sqlfp-paths").to_str().unwrap()).unwrap();

        let now = Utc::now();
        let q = "SELECT * FROM orders WHERE id = ?";
        store
            .track_sql_fingerprint("p1", "Orders#show", q, 10.0, now)
            .unwrap();
        let other = store
            .track_sql_fingerprint("p1", "Orders#index", q, 10.0, now)
            .unwrap();
        assert_eq!(other.total_count, 1);
    }

    #[test]
    fn concurrent_tracking_loses_nothing() {
        let dir = tempdir().unwrap();
        let store =
            Arc::new(Store::open(dir.path().join("sqlfp-race").to_str().unwrap()).unwrap());

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store
                        .track_sql_fingerprint(
                            "p1",
                            "Orders#show",
                            "SELECT 1",
                            1.0,
                            Utc::now(),
                        )
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let list = store.list_sql_fingerprints("p1", 10).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].total_count, 10);
    }

    #[test]
    fn historical_candidate_needs_count_and_cheapness() {
        let now = Utc::now();
        let mut fp = SqlFingerprint {
            project: "p1".to_string(),
            hash: "h".to_string(),
            call_path: "Orders#show".to_string(),
            query_kind: "select".to_string(),
            normalized: "SELECT 1".to_string(),
            total_count: 150,
            total_duration_ms: 1500.0, // mean 10ms
            min_duration_ms: 1.0,
            max_duration_ms: 20.0,
            first_seen: now,
            last_seen: now,
        };
        assert!(fp.is_n_plus_one_candidate(100, 50.0));

        fp.total_count = 50;
        fp.total_duration_ms = 500.0;
        assert!(!fp.is_n_plus_one_candidate(100, 50.0));

        fp.total_count = 150;
        fp.total_duration_ms = 150.0 * 80.0; // mean 80ms, no longer "cheap"
        assert!(!fp.is_n_plus_one_candidate(100, 50.0));
    }
}
