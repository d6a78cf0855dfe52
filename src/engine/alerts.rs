//! Alert rule vocabulary and the pure parts of dispatch: what a rule
//! reacts to, how severe a notification is, and the payload handed to the
//! notifier. Rate limiting and persistence live in the store; channel
//! delivery lives in the notifier service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    NewIssue,
    ErrorFrequency,
    PerformanceRegression,
    NPlusOne,
}

impl RuleType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewIssue => "new_issue",
            Self::ErrorFrequency => "error_frequency",
            Self::PerformanceRegression => "performance_regression",
            Self::NPlusOne => "n_plus_one",
        }
    }

    /// Per-fingerprint types deduplicate per distinct error; the others
    /// deduplicate per target or call path.
    pub fn is_per_fingerprint(self) -> bool {
        matches!(self, Self::NewIssue | Self::ErrorFrequency)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// What the notifier delivers. `detail` is rule-type specific and goes out
/// verbatim as the structured body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    pub rule_id: String,
    pub rule_type: RuleType,
    pub severity: AlertSeverity,
    pub project: String,
    pub dedup_key: String,
    pub summary: String,
    pub detail: Value,
    pub triggered_at: DateTime<Utc>,
}

/// A frequency rule with threshold zero never fires; it would alert on
/// every single event.
pub fn frequency_breached(window_count: u64, threshold: u64) -> bool {
    threshold > 0 && window_count >= threshold
}
