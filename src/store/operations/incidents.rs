use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::incidents::IncidentSeverity;
use crate::store::keys;
use crate::store::{Store, StoreError, MAX_CAS_ATTEMPTS};

/// A sustained threshold-breach episode for one (project, target). At most
/// one open incident exists per target; closed incidents are immutable
/// history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceIncident {
    pub id: String,
    pub project: String,
    pub target: String,
    pub severity: IncidentSeverity,
    /// Percentile that triggered the incident, "p95" or "p99".
    pub percentile: String,
    pub trigger_value_ms: f64,
    pub threshold_ms: f64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Each transition edge notifies at most once per incident lifetime.
    pub open_notified: bool,
    pub close_notified: bool,
}

impl Store {
    pub fn find_open_incident(
        &self,
        project: &str,
        target: &str,
    ) -> Result<Option<PerformanceIncident>, StoreError> {
        let key = keys::open_incident_key(project, target);
        match self.incidents_open.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Claim the open slot for a target. Returns false when another incident
    /// is already open; the compare-and-swap makes two racing evaluations
    /// unable to both open one.
    pub fn open_incident(&self, incident: &PerformanceIncident) -> Result<bool, StoreError> {
        let key = keys::open_incident_key(&incident.project, &incident.target);
        let bytes = Self::serialize(incident)?;
        let claimed = self
            .incidents_open
            .compare_and_swap(key.as_bytes(), None::<&[u8]>, Some(bytes))?
            .is_ok();
        Ok(claimed)
    }

    /// Apply `mutate` to the open incident under a CAS loop. Returns the
    /// updated record, or None when no incident is open.
    pub fn modify_open_incident<F>(
        &self,
        project: &str,
        target: &str,
        mutate: F,
    ) -> Result<Option<PerformanceIncident>, StoreError>
    where
        F: Fn(&mut PerformanceIncident),
    {
        let key = keys::open_incident_key(project, target);

        for _ in 0..MAX_CAS_ATTEMPTS {
            let Some(old_raw) = self.incidents_open.get(key.as_bytes())? else {
                return Ok(None);
            };
            let mut incident: PerformanceIncident = Self::deserialize(&old_raw)?;
            mutate(&mut incident);
            let new_bytes = Self::serialize(&incident)?;
            if self
                .incidents_open
                .compare_and_swap(key.as_bytes(), Some(old_raw.as_ref()), Some(new_bytes))?
                .is_ok()
            {
                return Ok(Some(incident));
            }
        }

        Err(StoreError::CasRetryExhausted {
            entity: "incident".to_string(),
            key,
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    /// Move the open incident to immutable history with `closed_at` set.
    /// Returns None when no incident was open (or another closer won).
    pub fn close_open_incident(
        &self,
        project: &str,
        target: &str,
        closed_at: DateTime<Utc>,
    ) -> Result<Option<PerformanceIncident>, StoreError> {
        let key = keys::open_incident_key(project, target);

        for _ in 0..MAX_CAS_ATTEMPTS {
            let Some(old_raw) = self.incidents_open.get(key.as_bytes())? else {
                return Ok(None);
            };
            let mut incident: PerformanceIncident = Self::deserialize(&old_raw)?;
            incident.closed_at = Some(closed_at);

            if self
                .incidents_open
                .compare_and_swap(key.as_bytes(), Some(old_raw.as_ref()), None::<&[u8]>)?
                .is_ok()
            {
                let history_key = keys::incident_history_key(
                    project,
                    target,
                    incident.opened_at.timestamp_millis(),
                    &incident.id,
                );
                self.incidents_history
                    .insert(history_key.as_bytes(), Self::serialize(&incident)?)?;
                return Ok(Some(incident));
            }
        }

        Err(StoreError::CasRetryExhausted {
            entity: "incident".to_string(),
            key,
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    /// Record that the close notification for a finished incident went out.
    pub fn mark_incident_close_notified(
        &self,
        incident: &PerformanceIncident,
    ) -> Result<(), StoreError> {
        let history_key = keys::incident_history_key(
            &incident.project,
            &incident.target,
            incident.opened_at.timestamp_millis(),
            &incident.id,
        );
        let mut updated = incident.clone();
        updated.close_notified = true;
        self.incidents_history
            .insert(history_key.as_bytes(), Self::serialize(&updated)?)?;
        Ok(())
    }

    /// Open incidents for a project.
    pub fn list_open_incidents(
        &self,
        project: &str,
    ) -> Result<Vec<PerformanceIncident>, StoreError> {
        let prefix = keys::open_incident_prefix(project);
        let mut incidents = Vec::new();
        for item in self.incidents_open.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item?;
            incidents.push(Self::deserialize::<PerformanceIncident>(&value)?);
        }
        Ok(incidents)
    }

    /// Closed incident history, most recently opened first.
    pub fn list_incident_history(
        &self,
        project: &str,
        limit: usize,
    ) -> Result<Vec<PerformanceIncident>, StoreError> {
        let prefix = keys::incident_history_prefix(project);
        let mut incidents = Vec::new();
        for item in self.incidents_history.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item?;
            incidents.push(Self::deserialize::<PerformanceIncident>(&value)?);
            if incidents.len() >= limit {
                break;
            }
        }
        Ok(incidents)
    }
}
