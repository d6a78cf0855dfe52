use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One frame of a captured call stack, ordered outermost-first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub file: String,
    pub line: u32,
    pub function: String,
    /// True for application code, false for framework internals.
    pub in_app: bool,
}

/// A single SQL query observed inside one request / unit of work.
/// The text is already normalized upstream (literals replaced by `?`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryObservation {
    pub normalized: String,
    pub duration_ms: f64,
}

/// A validated error occurrence handed to the core by the ingestion layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEventInput {
    pub project: String,
    pub kind: String,
    pub message: String,
    pub frames: Vec<StackFrame>,
    /// Call-path label such as `OrdersController#show`.
    pub call_path: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub queries: Vec<QueryObservation>,
}

/// A validated latency sample for one handled request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfEventInput {
    pub project: String,
    /// The measured target, typically an endpoint or transaction name.
    pub target: String,
    pub duration_ms: f64,
    #[serde(default)]
    pub error: bool,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub queries: Vec<QueryObservation>,
}

/// Rollup granularities. Coarser grains are derived from finer ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Minute,
    Hour,
    Day,
}

impl Timeframe {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }

    pub fn bucket_secs(self) -> i64 {
        match self {
            Self::Minute => 60,
            Self::Hour => 3600,
            Self::Day => 86400,
        }
    }

    /// The next finer granularity this one is aggregated from.
    pub fn finer(self) -> Option<Timeframe> {
        match self {
            Self::Minute => None,
            Self::Hour => Some(Self::Minute),
            Self::Day => Some(Self::Hour),
        }
    }

    pub fn parse(raw: &str) -> Option<Timeframe> {
        match raw {
            "minute" => Some(Self::Minute),
            "hour" => Some(Self::Hour),
            "day" => Some(Self::Day),
            _ => None,
        }
    }

    /// Start of the bucket containing `ts`, as epoch seconds.
    pub fn bucket_start(self, ts: DateTime<Utc>) -> i64 {
        let secs = ts.timestamp();
        secs - secs.rem_euclid(self.bucket_secs())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn bucket_start_truncates_to_grain() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 5, 10, 17, 42).unwrap();
        assert_eq!(Timeframe::Minute.bucket_start(ts) % 60, 0);
        assert_eq!(
            Timeframe::Hour.bucket_start(ts),
            Utc.with_ymd_and_hms(2026, 3, 5, 10, 0, 0).unwrap().timestamp()
        );
        assert_eq!(
            Timeframe::Day.bucket_start(ts),
            Utc.with_ymd_and_hms(2026, 3, 5, 0, 0, 0).unwrap().timestamp()
        );
    }

    #[test]
    fn timeframe_roundtrip_and_finer_chain() {
        for tf in [Timeframe::Minute, Timeframe::Hour, Timeframe::Day] {
            assert_eq!(Timeframe::parse(tf.as_str()), Some(tf));
        }
        assert_eq!(Timeframe::Day.finer(), Some(Timeframe::Hour));
        assert_eq!(Timeframe::Hour.finer(), Some(Timeframe::Minute));
        assert_eq!(Timeframe::Minute.finer(), None);
    }
}
