use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentSeverity {
    Warning,
    Critical,
}

/// Which rollup percentile drives the incident state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PercentileChoice {
    P95,
    P99,
}

impl PercentileChoice {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "p95" => Some(Self::P95),
            "p99" => Some(Self::P99),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::P95 => "p95",
            Self::P99 => "p99",
        }
    }
}

#[derive(Debug, Clone)]
pub struct IncidentPolicy {
    pub percentile: PercentileChoice,
    pub warning_ms: f64,
    pub critical_ms: f64,
    /// Consecutive breaching buckets required before an incident opens.
    pub warmup_buckets: usize,
    /// How long the percentile must stay below threshold before closing.
    pub cooldown_secs: i64,
    pub bucket_secs: i64,
}

impl IncidentPolicy {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        let percentile = PercentileChoice::parse(&cfg.incident_percentile).unwrap_or_else(|| {
            tracing::warn!(
                value = %cfg.incident_percentile,
                "Unknown incident percentile, falling back to p95"
            );
            PercentileChoice::P95
        });
        Self {
            percentile,
            warning_ms: cfg.incident_warning_ms,
            critical_ms: cfg.incident_critical_ms,
            warmup_buckets: cfg.incident_warmup_buckets.max(1),
            cooldown_secs: cfg.incident_cooldown_secs.max(0),
            bucket_secs: 60,
        }
    }

    fn breach(&self, value: f64) -> Option<IncidentSeverity> {
        if value >= self.critical_ms {
            Some(IncidentSeverity::Critical)
        } else if value >= self.warning_ms {
            Some(IncidentSeverity::Warning)
        } else {
            None
        }
    }
}

/// One observed rollup bucket for a target, already projected onto the
/// configured percentile.
#[derive(Debug, Clone, Copy)]
pub struct ObservedBucket {
    pub bucket_start: i64,
    pub value: f64,
}

/// The currently open incident, as far as the decision logic cares.
#[derive(Debug, Clone, Copy)]
pub struct OpenState {
    pub severity: IncidentSeverity,
    pub opened_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    None,
    Open {
        severity: IncidentSeverity,
        trigger_value: f64,
    },
    Raise {
        severity: IncidentSeverity,
        trigger_value: f64,
    },
    Close,
}

/// Hysteresis evaluation for one (project, target).
///
/// `buckets` must be ordered by ascending bucket start. A single breaching
/// bucket never opens an incident when the warm-up count is above one, and a
/// single clean bucket never closes one before the cooldown has elapsed.
pub fn evaluate(
    policy: &IncidentPolicy,
    open: Option<OpenState>,
    buckets: &[ObservedBucket],
    now: i64,
) -> Transition {
    match open {
        None => evaluate_open(policy, buckets),
        Some(state) => evaluate_close_or_raise(policy, state, buckets, now),
    }
}

fn evaluate_open(policy: &IncidentPolicy, buckets: &[ObservedBucket]) -> Transition {
    if buckets.len() < policy.warmup_buckets {
        return Transition::None;
    }

    let window = &buckets[buckets.len() - policy.warmup_buckets..];

    // Warm-up buckets must be adjacent: a gap means the breach was not sustained.
    for pair in window.windows(2) {
        if pair[1].bucket_start - pair[0].bucket_start != policy.bucket_secs {
            return Transition::None;
        }
    }

    let mut sustained = IncidentSeverity::Critical;
    for bucket in window {
        match policy.breach(bucket.value) {
            Some(level) => sustained = sustained.min(level),
            None => return Transition::None,
        }
    }

    Transition::Open {
        severity: sustained,
        trigger_value: window[window.len() - 1].value,
    }
}

fn evaluate_close_or_raise(
    policy: &IncidentPolicy,
    state: OpenState,
    buckets: &[ObservedBucket],
    now: i64,
) -> Transition {
    // Raise in place instead of opening a duplicate.
    if state.severity == IncidentSeverity::Warning {
        if let Some(last) = buckets.last() {
            if policy.breach(last.value) == Some(IncidentSeverity::Critical) {
                return Transition::Raise {
                    severity: IncidentSeverity::Critical,
                    trigger_value: last.value,
                };
            }
        }
    }

    // The quiet period starts at the most recent breach, or at open time if
    // no breach is visible in the supplied window.
    let last_breach = buckets
        .iter()
        .filter(|b| policy.breach(b.value).is_some())
        .map(|b| b.bucket_start + policy.bucket_secs)
        .max()
        .unwrap_or(state.opened_at);

    let has_clean_bucket_after = buckets
        .iter()
        .any(|b| b.bucket_start >= last_breach && policy.breach(b.value).is_none());

    if has_clean_bucket_after && now - last_breach >= policy.cooldown_secs {
        Transition::Close
    } else {
        Transition::None
    }
}
