use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::TransactionError;
use sled::Transactional;

use crate::engine::alerts::{AlertPayload, RuleType};
use crate::store::keys;
use crate::store::{Store, StoreError};

/// Audit record for one dispatched notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentNotification {
    pub id: u64,
    pub project: String,
    pub rule_id: String,
    pub rule_type: RuleType,
    pub dedup_key: String,
    pub channel: String,
    pub payload: AlertPayload,
    pub sent_at: DateTime<Utc>,
}

fn decode_last_sent_ms(bytes: &[u8]) -> Option<i64> {
    bytes.try_into().ok().map(i64::from_be_bytes)
}

impl Store {
    /// Check-and-set on the per-(rule, dedup key) rate limit. When the
    /// cooldown has elapsed the new timestamp and the notification record
    /// commit in one transaction, so of two racing evaluators exactly one
    /// gets `true` and there is never a recorded notification without the
    /// limiter knowing about it.
    pub fn try_reserve_notification(
        &self,
        notification: &SentNotification,
        cooldown_secs: i64,
    ) -> Result<bool, StoreError> {
        let state_key = keys::alert_state_key(
            &notification.project,
            &notification.rule_id,
            &notification.dedup_key,
        );
        let sent_ms = notification.sent_at.timestamp_millis();
        let record_key = keys::notification_key(sent_ms, notification.id);
        let record_bytes = Self::serialize(notification)?;

        let reserved = (&self.alert_state, &self.notifications)
            .transaction(|(state, records)| {
                if let Some(raw) = state.get(state_key.as_bytes())? {
                    if let Some(last_ms) = decode_last_sent_ms(&raw) {
                        if sent_ms - last_ms < cooldown_secs * 1000 {
                            return Ok(false);
                        }
                    }
                }
                state.insert(state_key.as_bytes(), &sent_ms.to_be_bytes())?;
                records.insert(record_key.as_bytes(), record_bytes.as_slice())?;
                Ok(true)
            })
            .map_err(|err: TransactionError<()>| match err {
                TransactionError::Abort(()) => StoreError::Conflict {
                    entity: "alert_state".to_string(),
                    key: state_key.clone(),
                },
                TransactionError::Storage(e) => StoreError::Sled(e),
            })?;

        Ok(reserved)
    }

    /// Dispatched notifications, newest first.
    pub fn list_notifications(
        &self,
        project: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SentNotification>, StoreError> {
        let mut out = Vec::new();
        for item in self.notifications.iter() {
            let (_, value) = item?;
            let record: SentNotification = Self::deserialize(&value)?;
            if project.map_or(true, |p| record.project == p) {
                out.push(record);
                if out.len() >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }

    /// Drop rate-limit entries older than the cutoff; a stale entry only
    /// means the next notification for that key goes through immediately.
    pub fn prune_alert_state_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let cutoff_ms = cutoff.timestamp_millis();
        let mut removed = 0u64;
        for item in self.alert_state.iter() {
            let (key, value) = item?;
            match decode_last_sent_ms(&value) {
                Some(last_ms) if last_ms >= cutoff_ms => {}
                _ => {
                    self.alert_state.remove(&key)?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}
