use crate::store::keys;
use crate::store::operations::alert_rules::default_rules;
use crate::store::{Store, StoreError};

const VERSION_KEY: &str = "_meta:version";

type MigrationFn = fn(&Store) -> Result<(), StoreError>;

fn migrations() -> Vec<(&'static str, MigrationFn)> {
    vec![
        ("001_initial", m001_initial),
        ("002_seed_default_alert_rules", m002_seed_default_alert_rules),
    ]
}

/// Run every migration not yet applied. Each migration must be idempotent:
/// a crash between `func()` and `set_version()` re-runs it on the next
/// start. The version checkpoint persists after each step and only moves
/// forward.
pub fn run(store: &Store) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    let all = migrations();

    for (index, (name, func)) in all.iter().enumerate() {
        let version = (index + 1) as u32;
        if version > current {
            tracing::info!(version, name, "Running migration");
            func(store)?;
            set_version(store, version)?;
            tracing::info!(version, name, "Migration complete");
        } else {
            tracing::debug!(version, name, "Migration already applied, skipping");
        }
    }

    Ok(())
}

pub fn get_current_version(store: &Store) -> Result<u32, StoreError> {
    match store.meta.get(VERSION_KEY.as_bytes())? {
        Some(raw) => {
            let bytes: [u8; 4] = raw.as_ref().try_into().unwrap_or([0; 4]);
            Ok(u32::from_be_bytes(bytes))
        }
        None => Ok(0),
    }
}

pub fn set_version(store: &Store, version: u32) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    if version < current {
        return Err(StoreError::Migration {
            version,
            message: format!("Refuse to downgrade from {} to {}", current, version),
        });
    }

    store
        .meta
        .insert(VERSION_KEY.as_bytes(), &version.to_be_bytes())?;
    Ok(())
}

fn m001_initial(_store: &Store) -> Result<(), StoreError> {
    Ok(())
}

/// Seed the catch-all default alert rules. Inserts only the ids that are
/// absent so operator edits to a seeded rule survive re-runs.
fn m002_seed_default_alert_rules(store: &Store) -> Result<(), StoreError> {
    for rule in default_rules() {
        let key = keys::alert_rule_key(&rule.project, &rule.id);
        if store.alert_rules.get(key.as_bytes())?.is_none() {
            store.upsert_alert_rule(&rule)?;
        }
    }
    Ok(())
}
