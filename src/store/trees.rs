pub const ISSUES: &str = "issues";
pub const EVENTS: &str = "events";
pub const EVENTS_BY_TIME: &str = "events_by_time";
pub const PERF_EVENTS: &str = "perf_events";
pub const SQL_FINGERPRINTS: &str = "sql_fingerprints";
pub const ROLLUPS: &str = "rollups";
pub const INCIDENTS_OPEN: &str = "incidents_open";
pub const INCIDENTS_HISTORY: &str = "incidents_history";
pub const ALERT_RULES: &str = "alert_rules";
pub const ALERT_STATE: &str = "alert_state";
pub const NOTIFICATIONS: &str = "notifications";
pub const META: &str = "meta";
