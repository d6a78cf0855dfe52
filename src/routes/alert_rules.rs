use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::extractors::JsonBody;
use crate::response::{created, ok, AppError};
use crate::state::AppState;
use crate::store::operations::alert_rules::{AlertRule, DEFAULT_RULE_PROJECT};
use crate::validation;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_rules).put(upsert_rule))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    project: String,
    /// When true, return the merged view a dispatcher would use instead of
    /// only the project's own rules.
    effective: Option<bool>,
}

fn validate_rule_project(project: &str) -> Result<(), AppError> {
    if project == DEFAULT_RULE_PROJECT {
        return Ok(());
    }
    validation::validate_project(project)
        .map_err(|e| AppError::bad_request("VALIDATION_ERROR", e))
}

async fn list_rules(
    Query(q): Query<ListQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    validate_rule_project(&q.project)?;
    let rules = if q.effective.unwrap_or(false) {
        state.store().effective_alert_rules(&q.project)?
    } else {
        state.store().list_alert_rules(&q.project)?
    };
    Ok(ok(rules))
}

async fn upsert_rule(
    State(state): State<AppState>,
    JsonBody(rule): JsonBody<AlertRule>,
) -> Result<impl IntoResponse, AppError> {
    validate_rule_project(&rule.project)?;
    state.store().upsert_alert_rule(&rule)?;
    Ok(created(rule))
}
