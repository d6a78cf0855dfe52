use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::response::{ok, AppError};
use crate::state::AppState;
use crate::validation;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_notifications))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    project: Option<String>,
    limit: Option<usize>,
}

async fn list_notifications(
    Query(q): Query<ListQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(project) = &q.project {
        validation::validate_project(project)
            .map_err(|e| AppError::bad_request("VALIDATION_ERROR", e))?;
    }
    let limit = q.limit.unwrap_or(50).clamp(1, 500);
    let records = state
        .store()
        .list_notifications(q.project.as_deref(), limit)?;
    Ok(ok(records))
}
