pub mod alert_rules;
pub mod alert_state;
pub mod events;
pub mod incidents;
pub mod issues;
pub mod perf_events;
pub mod rollups;
pub mod sql_fingerprints;
