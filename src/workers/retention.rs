//! Retention worker: drops raw events past the configured horizon.
//! Rollups and incident history are kept; they are the compact record the
//! raw data existed to produce.

use chrono::{Duration, Utc};

use crate::store::Store;

pub async fn run(store: &Store, retention_days: i64) {
    let cutoff = Utc::now() - Duration::days(retention_days.max(1));

    let errors = match store.prune_events_before(cutoff) {
        Ok(n) => n,
        Err(err) => {
            tracing::error!(error = %err, "Failed to prune error events");
            0
        }
    };

    let perf = match store.prune_perf_events_before(cutoff) {
        Ok(n) => n,
        Err(err) => {
            tracing::error!(error = %err, "Failed to prune perf events");
            0
        }
    };

    let alert_state = match store.prune_alert_state_before(cutoff) {
        Ok(n) => n,
        Err(err) => {
            tracing::error!(error = %err, "Failed to prune alert rate-limit state");
            0
        }
    };

    if let Err(err) = store.flush() {
        tracing::warn!(error = %err, "Flush after retention pruning failed");
    }

    tracing::info!(
        cutoff = %cutoff,
        error_events = errors,
        perf_events = perf,
        alert_state,
        "Retention pruning complete"
    );
}
