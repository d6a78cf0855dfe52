use std::time::Duration;

use rand::Rng;

use crate::config::NotifierConfig;
use crate::engine::alerts::AlertPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NotifierMode {
    Log,
    Webhook,
}

/// Delivers alert payloads to the configured channel. Delivery is
/// fire-and-forget from the caller's point of view: the dispatcher has
/// already committed the notification record, so a channel failure is
/// logged and retried but never unwinds ingestion.
#[derive(Debug, Clone)]
pub struct Notifier {
    config: NotifierConfig,
    mode: NotifierMode,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("webhook network error: {0}")]
    Network(String),
    #[error("webhook returned status {status}")]
    Status { status: u16 },
}

impl Notifier {
    pub fn new(config: &NotifierConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config: config.clone(),
            mode: parse_mode(&config.mode),
            client,
        }
    }

    /// Validate notifier configuration at startup. Panics on a mode the
    /// binary cannot honor; failing fast beats silently dropping alerts.
    pub fn validate_config(config: &NotifierConfig) {
        match config.mode.as_str() {
            "log" => {}
            "webhook" => {
                if config.webhook_url.trim().is_empty() {
                    panic!(
                        "Invalid notifier configuration: NOTIFIER_MODE=webhook \
                         requires NOTIFIER_WEBHOOK_URL to be set."
                    );
                }
            }
            other => {
                panic!(
                    "Invalid notifier configuration: unknown NOTIFIER_MODE {other:?}, \
                     expected \"log\" or \"webhook\"."
                );
            }
        }
    }

    /// Hand a payload to the channel in the background, with bounded
    /// retries and jittered backoff on webhook failures.
    pub fn dispatch(&self, payload: AlertPayload) {
        let notifier = self.clone();
        tokio::spawn(async move {
            let max_attempts = notifier.config.max_attempts.max(1);
            for attempt in 1..=max_attempts {
                match notifier.deliver(&payload).await {
                    Ok(()) => return,
                    Err(err) => {
                        tracing::warn!(
                            attempt,
                            max_attempts,
                            rule_id = %payload.rule_id,
                            error = %err,
                            "Alert delivery failed"
                        );
                        if attempt < max_attempts {
                            let backoff = Duration::from_millis(
                                500u64.saturating_mul(1 << (attempt - 1))
                                    + rand::thread_rng().gen_range(0..250),
                            );
                            tokio::time::sleep(backoff).await;
                        }
                    }
                }
            }
            tracing::error!(
                rule_id = %payload.rule_id,
                dedup_key = %payload.dedup_key,
                "Giving up on alert delivery"
            );
        });
    }

    pub async fn deliver(&self, payload: &AlertPayload) -> Result<(), NotifyError> {
        match self.mode {
            NotifierMode::Log => {
                tracing::warn!(
                    rule_id = %payload.rule_id,
                    rule_type = payload.rule_type.as_str(),
                    severity = ?payload.severity,
                    project = %payload.project,
                    dedup_key = %payload.dedup_key,
                    summary = %payload.summary,
                    "ALERT"
                );
                Ok(())
            }
            NotifierMode::Webhook => {
                let response = self
                    .client
                    .post(&self.config.webhook_url)
                    .json(payload)
                    .send()
                    .await
                    .map_err(|e| NotifyError::Network(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(NotifyError::Status {
                        status: response.status().as_u16(),
                    });
                }
                Ok(())
            }
        }
    }
}

fn parse_mode(mode: &str) -> NotifierMode {
    match mode {
        "webhook" => NotifierMode::Webhook,
        _ => NotifierMode::Log,
    }
}
