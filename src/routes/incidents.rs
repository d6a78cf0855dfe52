use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::response::{ok, AppError};
use crate::state::AppState;
use crate::validation;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/open", get(list_open))
        .route("/history", get(list_history))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenQuery {
    project: String,
}

async fn list_open(
    Query(q): Query<OpenQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    validation::validate_project(&q.project)
        .map_err(|e| AppError::bad_request("VALIDATION_ERROR", e))?;
    Ok(ok(state.store().list_open_incidents(&q.project)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryQuery {
    project: String,
    limit: Option<usize>,
}

async fn list_history(
    Query(q): Query<HistoryQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    validation::validate_project(&q.project)
        .map_err(|e| AppError::bad_request("VALIDATION_ERROR", e))?;
    let limit = q.limit.unwrap_or(50).clamp(1, 500);
    Ok(ok(state.store().list_incident_history(&q.project, limit)?))
}
