use serde::{Deserialize, Serialize};

use crate::engine::alerts::RuleType;
use crate::store::keys;
use crate::store::{Store, StoreError};

/// Project value under which the seeded default rules live; they apply to
/// any project that has not overridden the rule type.
pub const DEFAULT_RULE_PROJECT: &str = "*";

/// Read-only configuration input to the alert evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    pub id: String,
    pub project: String,
    pub rule_type: RuleType,
    pub enabled: bool,
    /// Occurrence threshold; only meaningful for error_frequency.
    pub threshold: u64,
    /// Observation window for threshold rules, seconds.
    pub window_secs: u64,
    /// Minimum spacing between notifications per dedup key, seconds.
    pub cooldown_secs: i64,
    /// Channel hint passed through to the notifier.
    pub channel: String,
}

pub fn default_rules() -> Vec<AlertRule> {
    let rule = |id: &str, rule_type: RuleType, threshold: u64, window_secs: u64| AlertRule {
        id: id.to_string(),
        project: DEFAULT_RULE_PROJECT.to_string(),
        rule_type,
        enabled: true,
        threshold,
        window_secs,
        cooldown_secs: 1800,
        channel: "default".to_string(),
    };
    vec![
        rule("default-new-issue", RuleType::NewIssue, 0, 0),
        rule("default-error-frequency", RuleType::ErrorFrequency, 10, 3600),
        rule(
            "default-performance-regression",
            RuleType::PerformanceRegression,
            0,
            0,
        ),
        rule("default-n-plus-one", RuleType::NPlusOne, 0, 0),
    ]
}

impl Store {
    pub fn upsert_alert_rule(&self, rule: &AlertRule) -> Result<(), StoreError> {
        if rule.id.is_empty() {
            return Err(StoreError::Validation("alert rule id is required".into()));
        }
        let key = keys::alert_rule_key(&rule.project, &rule.id);
        self.alert_rules
            .insert(key.as_bytes(), Self::serialize(rule)?)?;
        Ok(())
    }

    pub fn list_alert_rules(&self, project: &str) -> Result<Vec<AlertRule>, StoreError> {
        let prefix = keys::alert_rule_prefix(project);
        let mut rules = Vec::new();
        for item in self.alert_rules.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item?;
            rules.push(Self::deserialize::<AlertRule>(&value)?);
        }
        Ok(rules)
    }

    /// Enabled rules that apply to a project: its own rules plus the seeded
    /// defaults for rule types the project has not overridden.
    pub fn effective_alert_rules(&self, project: &str) -> Result<Vec<AlertRule>, StoreError> {
        let own = self.list_alert_rules(project)?;
        let mut rules: Vec<AlertRule> = own.clone();
        for default in self.list_alert_rules(DEFAULT_RULE_PROJECT)? {
            if !own.iter().any(|r| r.rule_type == default.rule_type) {
                rules.push(default);
            }
        }
        rules.retain(|r| r.enabled);
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn open_store(name: &str) -> (tempfile::TempDir, Store) {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join(name).to_str().unwrap()).unwrap();
        (dir, store)
    }

    fn seed(store: &Store) {
        for rule in default_rules() {
            store.upsert_alert_rule(&rule).unwrap();
        }
    }

    #[test]
    fn defaults_apply_to_any_project() {
        let (_dir, store) = open_store("rules-defaults");
        seed(&store);

        let rules = store.effective_alert_rules("p1").unwrap();
        assert_eq!(rules.len(), 4);
    }

    #[test]
    fn project_rule_overrides_default_of_same_type() {
        let (_dir, store) = open_store("rules-override");
        seed(&store);

        let mut own = default_rules()[1].clone();
        own.id = "p1-frequency".to_string();
        own.project = "p1".to_string();
        own.threshold = 50;
        store.upsert_alert_rule(&own).unwrap();

        let rules = store.effective_alert_rules("p1").unwrap();
        let freq: Vec<_> = rules
            .iter()
            .filter(|r| r.rule_type == RuleType::ErrorFrequency)
            .collect();
        assert_eq!(freq.len(), 1);
        assert_eq!(freq[0].threshold, 50);
    }

    #[test]
    fn disabled_rules_are_filtered_out() {
        let (_dir, store) = open_store("rules-disabled");
        seed(&store);

        let mut own = default_rules()[0].clone();
        own.id = "p1-new-issue".to_string();
        own.project = "p1".to_string();
        own.enabled = false;
        store.upsert_alert_rule(&own).unwrap();

        let rules = store.effective_alert_rules("p1").unwrap();
        assert!(rules.iter().all(|r| r.rule_type != RuleType::NewIssue));
    }

    #[test]
    fn empty_rule_id_is_rejected() {
        let (_dir, store) = open_store("rules-invalid");
        let mut rule = default_rules()[0].clone();
        rule.id = String::new();
        assert!(matches!(
            store.upsert_alert_rule(&rule),
            Err(StoreError::Validation(_))
        ));
    }
}
