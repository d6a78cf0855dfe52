//! Alert dispatch: turns engine signals into at-most-one notification per
//! (rule, dedup key, cooldown window). The reservation in the store is the
//! single gate; whoever loses it drops the signal silently.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::engine::alerts::{frequency_breached, AlertPayload, AlertSeverity, RuleType};
use crate::engine::incidents::IncidentSeverity;
use crate::engine::nplusone::NPlusOneCandidate;
use crate::services::notifier::Notifier;
use crate::store::operations::alert_rules::AlertRule;
use crate::store::operations::alert_state::SentNotification;
use crate::store::operations::incidents::PerformanceIncident;
use crate::store::operations::issues::Issue;
use crate::store::{Store, StoreError};

#[derive(Clone)]
pub struct AlertDispatcher {
    store: Arc<Store>,
    notifier: Arc<Notifier>,
}

impl AlertDispatcher {
    pub fn new(store: Arc<Store>, notifier: Arc<Notifier>) -> Self {
        Self { store, notifier }
    }

    /// First occurrence of a fingerprint.
    pub fn issue_created(&self, issue: &Issue) -> Result<(), StoreError> {
        for rule in self.rules_of_type(&issue.project, RuleType::NewIssue)? {
            let payload = AlertPayload {
                rule_id: rule.id.clone(),
                rule_type: RuleType::NewIssue,
                severity: AlertSeverity::Warning,
                project: issue.project.clone(),
                dedup_key: issue.fingerprint.clone(),
                summary: format!("New issue: {} at {}", issue.kind, issue.origin),
                detail: serde_json::json!({
                    "fingerprint": issue.fingerprint,
                    "kind": issue.kind,
                    "origin": issue.origin,
                    "callPath": issue.call_path,
                    "message": issue.last_message,
                }),
                triggered_at: Utc::now(),
            };
            self.send(&rule, payload)?;
        }
        Ok(())
    }

    /// Every occurrence of an existing fingerprint; fires when the count
    /// inside the rule's window reaches its threshold.
    pub fn issue_occurrence(&self, issue: &Issue) -> Result<(), StoreError> {
        for rule in self.rules_of_type(&issue.project, RuleType::ErrorFrequency)? {
            let since = Utc::now() - Duration::seconds(rule.window_secs as i64);
            let window_count =
                self.store
                    .count_issue_events_since(&issue.project, &issue.fingerprint, since)?;
            if !frequency_breached(window_count, rule.threshold) {
                continue;
            }
            let payload = AlertPayload {
                rule_id: rule.id.clone(),
                rule_type: RuleType::ErrorFrequency,
                severity: AlertSeverity::Critical,
                project: issue.project.clone(),
                dedup_key: issue.fingerprint.clone(),
                summary: format!(
                    "{} occurred {} times in the last {}s",
                    issue.kind, window_count, rule.window_secs
                ),
                detail: serde_json::json!({
                    "fingerprint": issue.fingerprint,
                    "kind": issue.kind,
                    "origin": issue.origin,
                    "windowCount": window_count,
                    "windowSecs": rule.window_secs,
                    "threshold": rule.threshold,
                    "totalCount": issue.count,
                }),
                triggered_at: Utc::now(),
            };
            self.send(&rule, payload)?;
        }
        Ok(())
    }

    /// Repeated-query burst inside a single request.
    pub fn n_plus_one_detected(
        &self,
        project: &str,
        call_path: &str,
        candidate: &NPlusOneCandidate,
    ) -> Result<(), StoreError> {
        for rule in self.rules_of_type(project, RuleType::NPlusOne)? {
            let payload = AlertPayload {
                rule_id: rule.id.clone(),
                rule_type: RuleType::NPlusOne,
                severity: AlertSeverity::Warning,
                project: project.to_string(),
                dedup_key: call_path.to_string(),
                summary: format!(
                    "N+1 query pattern in {}: {} repetitions",
                    call_path, candidate.repetitions
                ),
                detail: serde_json::json!({
                    "callPath": call_path,
                    "normalized": candidate.normalized,
                    "repetitions": candidate.repetitions,
                    "meanDurationMs": candidate.mean_duration_ms,
                    "totalDurationMs": candidate.total_duration_ms,
                    "candidateSeverity": candidate.severity,
                }),
                triggered_at: Utc::now(),
            };
            self.send(&rule, payload)?;
        }
        Ok(())
    }

    pub fn incident_opened(&self, incident: &PerformanceIncident) -> Result<(), StoreError> {
        self.incident_edge(incident, "opened")
    }

    /// Severity escalation of an already-open incident.
    pub fn incident_raised(&self, incident: &PerformanceIncident) -> Result<(), StoreError> {
        self.incident_edge(incident, "raised")
    }

    pub fn incident_closed(&self, incident: &PerformanceIncident) -> Result<(), StoreError> {
        self.incident_edge(incident, "closed")
    }

    fn incident_edge(
        &self,
        incident: &PerformanceIncident,
        edge: &str,
    ) -> Result<(), StoreError> {
        for rule in self.rules_of_type(&incident.project, RuleType::PerformanceRegression)? {
            let severity = match incident.severity {
                IncidentSeverity::Critical => AlertSeverity::Critical,
                IncidentSeverity::Warning => AlertSeverity::Warning,
            };
            let payload = AlertPayload {
                rule_id: rule.id.clone(),
                rule_type: RuleType::PerformanceRegression,
                severity: if edge == "closed" {
                    AlertSeverity::Info
                } else {
                    severity
                },
                project: incident.project.clone(),
                // The edge is part of the dedup key so a close notification
                // is never swallowed by the open notification's cooldown.
                dedup_key: format!("{}#{edge}", incident.target),
                summary: format!(
                    "Incident {edge}: {} {} {:.0}ms (threshold {:.0}ms)",
                    incident.target,
                    incident.percentile,
                    incident.trigger_value_ms,
                    incident.threshold_ms
                ),
                detail: serde_json::json!({
                    "incidentId": incident.id,
                    "target": incident.target,
                    "edge": edge,
                    "severity": incident.severity,
                    "percentile": incident.percentile,
                    "triggerValueMs": incident.trigger_value_ms,
                    "thresholdMs": incident.threshold_ms,
                    "openedAt": incident.opened_at,
                    "closedAt": incident.closed_at,
                }),
                triggered_at: Utc::now(),
            };
            self.send(&rule, payload)?;
        }
        Ok(())
    }

    fn rules_of_type(
        &self,
        project: &str,
        rule_type: RuleType,
    ) -> Result<Vec<AlertRule>, StoreError> {
        let mut rules = self.store.effective_alert_rules(project)?;
        rules.retain(|r| r.rule_type == rule_type);
        Ok(rules)
    }

    fn send(&self, rule: &AlertRule, payload: AlertPayload) -> Result<(), StoreError> {
        let sent_at = payload.triggered_at;
        let notification = SentNotification {
            id: self.store.next_id()?,
            project: payload.project.clone(),
            rule_id: rule.id.clone(),
            rule_type: rule.rule_type,
            dedup_key: payload.dedup_key.clone(),
            channel: rule.channel.clone(),
            payload,
            sent_at,
        };

        if self
            .store
            .try_reserve_notification(&notification, rule.cooldown_secs)?
        {
            tracing::info!(
                rule_id = %rule.id,
                rule_type = rule.rule_type.as_str(),
                project = %notification.project,
                dedup_key = %notification.dedup_key,
                "Dispatching alert"
            );
            self.notifier.dispatch(notification.payload);
        } else {
            tracing::debug!(
                rule_id = %rule.id,
                dedup_key = %notification.dedup_key,
                "Alert suppressed by cooldown"
            );
        }
        Ok(())
    }
}
