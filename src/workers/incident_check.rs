//! Incident evaluation worker: feeds recent minute rollups through the
//! hysteresis state machine and persists the resulting transitions.
//! Targets with no recent rollups are skipped; absence of data is not
//! evidence of recovery, so their incidents stay open.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::engine::incidents::{
    evaluate, IncidentPolicy, IncidentSeverity, ObservedBucket, OpenState, PercentileChoice,
    Transition,
};
use crate::engine::types::Timeframe;
use crate::services::alerting::AlertDispatcher;
use crate::store::operations::incidents::PerformanceIncident;
use crate::store::operations::rollups::PerfRollup;
use crate::store::{Store, StoreError};

fn observed_value(rollup: &PerfRollup, percentile: PercentileChoice) -> f64 {
    match percentile {
        PercentileChoice::P95 => rollup.p95_ms,
        PercentileChoice::P99 => rollup.p99_ms,
    }
}

fn threshold_for(policy: &IncidentPolicy, severity: IncidentSeverity) -> f64 {
    match severity {
        IncidentSeverity::Warning => policy.warning_ms,
        IncidentSeverity::Critical => policy.critical_ms,
    }
}

/// Evaluate every target that produced minute rollups recently. Returns
/// the number of transitions applied.
pub fn check_all(
    store: &Store,
    policy: &IncidentPolicy,
    dispatcher: &AlertDispatcher,
    now: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let now_secs = now.timestamp();
    // Enough history to see the full warm-up window plus the cooldown.
    let lookback = policy.bucket_secs * (policy.warmup_buckets as i64 + 2) + policy.cooldown_secs;
    let rollups =
        store.rollups_for_timeframe(Timeframe::Minute, now_secs - lookback, now_secs + 1)?;

    let mut groups: HashMap<(String, String), Vec<ObservedBucket>> = HashMap::new();
    for rollup in &rollups {
        groups
            .entry((rollup.project.clone(), rollup.target.clone()))
            .or_default()
            .push(ObservedBucket {
                bucket_start: rollup.bucket_start,
                value: observed_value(rollup, policy.percentile),
            });
    }

    let mut transitions = 0usize;
    for ((project, target), mut buckets) in groups {
        buckets.sort_by_key(|b| b.bucket_start);
        match check_target(store, policy, dispatcher, &project, &target, &buckets, now) {
            Ok(applied) => {
                if applied {
                    transitions += 1;
                }
            }
            Err(err) => {
                tracing::error!(
                    project = %project,
                    target = %target,
                    error = %err,
                    "Incident evaluation failed for target"
                );
            }
        }
    }
    Ok(transitions)
}

fn check_target(
    store: &Store,
    policy: &IncidentPolicy,
    dispatcher: &AlertDispatcher,
    project: &str,
    target: &str,
    buckets: &[ObservedBucket],
    now: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let open = store.find_open_incident(project, target)?;
    let open_state = open.as_ref().map(|i| OpenState {
        severity: i.severity,
        opened_at: i.opened_at.timestamp(),
    });

    match evaluate(policy, open_state, buckets, now.timestamp()) {
        Transition::None => Ok(false),
        Transition::Open {
            severity,
            trigger_value,
        } => {
            let incident = PerformanceIncident {
                id: Uuid::new_v4().to_string(),
                project: project.to_string(),
                target: target.to_string(),
                severity,
                percentile: policy.percentile.as_str().to_string(),
                trigger_value_ms: trigger_value,
                threshold_ms: threshold_for(policy, severity),
                opened_at: now,
                closed_at: None,
                open_notified: false,
                close_notified: false,
            };
            // The slot claim is the race arbiter; a losing evaluator
            // neither opens nor notifies.
            if store.open_incident(&incident)? {
                tracing::warn!(
                    project = %project,
                    target = %target,
                    severity = ?severity,
                    trigger_value_ms = trigger_value,
                    "Performance incident opened"
                );
                dispatcher.incident_opened(&incident)?;
                store.modify_open_incident(project, target, |i| i.open_notified = true)?;
                Ok(true)
            } else {
                Ok(false)
            }
        }
        Transition::Raise {
            severity,
            trigger_value,
        } => {
            let updated = store.modify_open_incident(project, target, |i| {
                i.severity = severity;
                i.trigger_value_ms = trigger_value;
                i.threshold_ms = threshold_for(policy, severity);
            })?;
            if let Some(incident) = updated {
                tracing::warn!(
                    project = %project,
                    target = %target,
                    "Performance incident raised to critical"
                );
                dispatcher.incident_raised(&incident)?;
                Ok(true)
            } else {
                Ok(false)
            }
        }
        Transition::Close => {
            if let Some(closed) = store.close_open_incident(project, target, now)? {
                tracing::info!(
                    project = %project,
                    target = %target,
                    opened_at = %closed.opened_at,
                    "Performance incident closed"
                );
                dispatcher.incident_closed(&closed)?;
                store.mark_incident_close_notified(&closed)?;
                Ok(true)
            } else {
                Ok(false)
            }
        }
    }
}

pub async fn run(store: &Store, policy: &IncidentPolicy, dispatcher: &AlertDispatcher) {
    match check_all(store, policy, dispatcher, Utc::now()) {
        Ok(transitions) if transitions > 0 => {
            tracing::info!(transitions, "Incident check applied transitions");
        }
        Ok(_) => {}
        Err(err) => {
            tracing::error!(error = %err, "Incident check failed");
        }
    }
}
