use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, patch};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::extractors::JsonBody;
use crate::response::{ok, AppError};
use crate::state::AppState;
use crate::store::operations::events::ErrorEvent;
use crate::store::operations::issues::{Issue, IssueStatus};
use crate::validation;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_issues))
        .route("/:fingerprint", get(get_issue))
        .route("/:fingerprint/status", patch(set_status))
}

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 200;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    project: String,
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IssueListResponse {
    issues: Vec<Issue>,
    total: usize,
}

async fn list_issues(
    Query(q): Query<ListQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    validation::validate_project(&q.project)
        .map_err(|e| AppError::bad_request("VALIDATION_ERROR", e))?;

    let limit = q.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = q.offset.unwrap_or(0);
    let issues = state.store().list_issues(&q.project, limit, offset)?;
    let total = state.store().count_issues(&q.project)?;
    Ok(ok(IssueListResponse { issues, total }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailQuery {
    project: String,
    events: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IssueDetailResponse {
    issue: Issue,
    recent_events: Vec<ErrorEvent>,
}

async fn get_issue(
    Path(fingerprint): Path<String>,
    Query(q): Query<DetailQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let issue = state
        .store()
        .get_issue(&q.project, &fingerprint)?
        .ok_or_else(|| AppError::not_found("Issue not found"))?;

    let limit = q.events.unwrap_or(10).clamp(1, 100);
    let recent_events = state.store().get_issue_events(&q.project, &fingerprint, limit)?;

    Ok(ok(IssueDetailResponse {
        issue,
        recent_events,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetStatusRequest {
    project: String,
    status: IssueStatus,
}

async fn set_status(
    Path(fingerprint): Path<String>,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SetStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    let issue = state
        .store()
        .set_issue_status(&req.project, &fingerprint, req.status)?;
    Ok(ok(issue))
}
