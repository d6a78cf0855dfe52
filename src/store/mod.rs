pub mod keys;
pub mod migrate;
pub mod operations;
pub mod trees;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use thiserror::Error;

/// Bounded retry budget for compare-and-swap loops on hot counters.
pub const MAX_CAS_ATTEMPTS: u32 = 16;

#[derive(Debug)]
pub struct Store {
    db: Db,
    pub issues: sled::Tree,
    pub events: sled::Tree,
    pub events_by_time: sled::Tree,
    pub perf_events: sled::Tree,
    pub sql_fingerprints: sled::Tree,
    pub rollups: sled::Tree,
    pub incidents_open: sled::Tree,
    pub incidents_history: sled::Tree,
    pub alert_rules: sled::Tree,
    pub alert_state: sled::Tree,
    pub notifications: sled::Tree,
    pub meta: sled::Tree,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("conflict: entity={entity}, key={key}")]
    Conflict { entity: String, key: String },
    #[error("CAS retry exhausted after {attempts} attempts: entity={entity}, key={key}")]
    CasRetryExhausted {
        entity: String,
        key: String,
        attempts: u32,
    },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("migration error at version {version}: {message}")]
    Migration { version: u32, message: String },
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let issues = db.open_tree(trees::ISSUES)?;
        let events = db.open_tree(trees::EVENTS)?;
        let events_by_time = db.open_tree(trees::EVENTS_BY_TIME)?;
        let perf_events = db.open_tree(trees::PERF_EVENTS)?;
        let sql_fingerprints = db.open_tree(trees::SQL_FINGERPRINTS)?;
        let rollups = db.open_tree(trees::ROLLUPS)?;
        let incidents_open = db.open_tree(trees::INCIDENTS_OPEN)?;
        let incidents_history = db.open_tree(trees::INCIDENTS_HISTORY)?;
        let alert_rules = db.open_tree(trees::ALERT_RULES)?;
        let alert_state = db.open_tree(trees::ALERT_STATE)?;
        let notifications = db.open_tree(trees::NOTIFICATIONS)?;
        let meta = db.open_tree(trees::META)?;

        Ok(Self {
            db,
            issues,
            events,
            events_by_time,
            perf_events,
            sql_fingerprints,
            rollups,
            incidents_open,
            incidents_history,
            alert_rules,
            alert_state,
            notifications,
            meta,
        })
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        migrate::run(self)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    /// Monotonically increasing id, shared across the whole database.
    pub fn next_id(&self) -> Result<u64, StoreError> {
        Ok(self.db.generate_id()?)
    }

    pub fn raw_db(&self) -> &Db {
        &self.db
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
