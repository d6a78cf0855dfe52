use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::response::{ok, AppError};
use crate::state::AppState;
use crate::store::operations::sql_fingerprints::SqlFingerprint;
use crate::validation;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_fingerprints))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    project: String,
    limit: Option<usize>,
    /// When true, only shapes matching the historical N+1 profile.
    candidates_only: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FingerprintView {
    #[serde(flatten)]
    fingerprint: SqlFingerprint,
    mean_duration_ms: f64,
    n_plus_one_candidate: bool,
}

async fn list_fingerprints(
    Query(q): Query<ListQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    validation::validate_project(&q.project)
        .map_err(|e| AppError::bad_request("VALIDATION_ERROR", e))?;
    let limit = q.limit.unwrap_or(50).clamp(1, 500);

    let engine = &state.config().engine;
    let mut views: Vec<FingerprintView> = state
        .store()
        .list_sql_fingerprints(&q.project, limit)?
        .into_iter()
        .map(|fp| {
            let mean = fp.mean_duration_ms();
            let candidate = fp.is_n_plus_one_candidate(
                engine.n_plus_one_historical_count,
                engine.n_plus_one_cheap_ceiling_ms,
            );
            FingerprintView {
                fingerprint: fp,
                mean_duration_ms: mean,
                n_plus_one_candidate: candidate,
            }
        })
        .collect();

    if q.candidates_only.unwrap_or(false) {
        views.retain(|v| v.n_plus_one_candidate);
    }
    Ok(ok(views))
}
