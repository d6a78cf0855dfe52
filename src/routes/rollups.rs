use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::engine::types::Timeframe;
use crate::response::{ok, AppError};
use crate::state::AppState;
use crate::validation;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_rollups))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RollupQuery {
    project: String,
    target: String,
    timeframe: String,
    /// Epoch seconds, inclusive.
    from: i64,
    /// Epoch seconds, exclusive.
    to: i64,
}

async fn list_rollups(
    Query(q): Query<RollupQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    validation::validate_project(&q.project)
        .map_err(|e| AppError::bad_request("VALIDATION_ERROR", e))?;
    validation::validate_target(&q.target)
        .map_err(|e| AppError::bad_request("VALIDATION_ERROR", e))?;
    let timeframe = Timeframe::parse(&q.timeframe).ok_or_else(|| {
        AppError::bad_request(
            "VALIDATION_ERROR",
            "timeframe must be one of minute, hour, day",
        )
    })?;
    if q.to <= q.from {
        return Err(AppError::bad_request(
            "VALIDATION_ERROR",
            "to must be greater than from",
        ));
    }

    let rollups = state
        .store()
        .rollups_in_range(&q.project, &q.target, timeframe, q.from, q.to)?;
    Ok(ok(rollups))
}
