//! Composite sled keys. Timestamps are zero-padded to 20 digits so byte
//! order matches numeric order; "reverse" timestamps sort newest-first.

fn reverse_ts(timestamp_ms: i64) -> u64 {
    u64::MAX - timestamp_ms.max(0) as u64
}

pub fn issue_key(project: &str, fingerprint: &str) -> String {
    format!("{}:{}", project, fingerprint)
}

pub fn issue_prefix(project: &str) -> String {
    format!("{}:", project)
}

pub fn event_key(project: &str, fingerprint: &str, timestamp_ms: i64, event_id: &str) -> String {
    format!(
        "{}:{}:{:020}:{}",
        project,
        fingerprint,
        reverse_ts(timestamp_ms),
        event_id
    )
}

pub fn event_prefix(project: &str, fingerprint: &str) -> String {
    format!("{}:{}:", project, fingerprint)
}

pub fn event_time_index_key(timestamp_ms: i64, event_id: &str) -> String {
    format!("{:020}:{}", timestamp_ms.max(0) as u64, event_id)
}

pub fn perf_event_key(timestamp_ms: i64, event_id: &str) -> String {
    format!("{:020}:{}", timestamp_ms.max(0) as u64, event_id)
}

pub fn time_range_start(timestamp_ms: i64) -> String {
    format!("{:020}", timestamp_ms.max(0) as u64)
}

pub fn sql_fingerprint_key(project: &str, hash: &str) -> String {
    format!("{}:{}", project, hash)
}

pub fn sql_fingerprint_prefix(project: &str) -> String {
    format!("{}:", project)
}

pub fn rollup_key(project: &str, target: &str, timeframe: &str, bucket_start: i64) -> String {
    format!(
        "{}:{}:{}:{:020}",
        project,
        target,
        timeframe,
        bucket_start.max(0) as u64
    )
}

pub fn rollup_prefix(project: &str, target: &str, timeframe: &str) -> String {
    format!("{}:{}:{}:", project, target, timeframe)
}

pub fn open_incident_key(project: &str, target: &str) -> String {
    format!("{}:{}", project, target)
}

pub fn open_incident_prefix(project: &str) -> String {
    format!("{}:", project)
}

pub fn incident_history_key(
    project: &str,
    target: &str,
    opened_at_ms: i64,
    incident_id: &str,
) -> String {
    format!(
        "{}:{}:{:020}:{}",
        project,
        target,
        reverse_ts(opened_at_ms),
        incident_id
    )
}

pub fn incident_history_prefix(project: &str) -> String {
    format!("{}:", project)
}

pub fn alert_rule_key(project: &str, rule_id: &str) -> String {
    format!("{}:{}", project, rule_id)
}

pub fn alert_rule_prefix(project: &str) -> String {
    format!("{}:", project)
}

pub fn alert_state_key(project: &str, rule_id: &str, dedup_key: &str) -> String {
    format!("{}:{}:{}", project, rule_id, dedup_key)
}

pub fn notification_key(timestamp_ms: i64, notification_id: u64) -> String {
    format!("{:020}:{:020}", reverse_ts(timestamp_ms), notification_id)
}
