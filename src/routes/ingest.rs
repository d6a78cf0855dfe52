use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::engine::types::{ErrorEventInput, PerfEventInput};
use crate::extractors::JsonBody;
use crate::response::{created, ok, AppError};
use crate::services::alerting::AlertDispatcher;
use crate::services::ingest::{ErrorIngestOutcome, IngestService, PerfIngestOutcome};
use crate::state::AppState;
use crate::validation;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(ingest_one))
        .route("/batch", post(ingest_batch))
}

fn service(state: &AppState) -> IngestService {
    let dispatcher = AlertDispatcher::new(state.store_arc(), state.notifier_arc());
    IngestService::new(
        state.store_arc(),
        state.fingerprinter_arc(),
        dispatcher,
        state.config().engine.clone(),
    )
}

/// One ingest item; the `type` tag selects the pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IngestItem {
    Error(ErrorEventInput),
    Performance(PerfEventInput),
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum IngestOutcome {
    Error(ErrorIngestOutcome),
    Performance(PerfIngestOutcome),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchItemResult {
    accepted: bool,
    outcome: Option<IngestOutcome>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchResponse {
    accepted: usize,
    rejected: usize,
    results: Vec<BatchItemResult>,
}

fn process_item(service: &IngestService, item: &IngestItem) -> Result<IngestOutcome, AppError> {
    match item {
        IngestItem::Error(input) => Ok(IngestOutcome::Error(service.process_error_event(input)?)),
        IngestItem::Performance(input) => Ok(IngestOutcome::Performance(
            service.process_perf_event(input)?,
        )),
    }
}

async fn ingest_one(
    State(state): State<AppState>,
    JsonBody(item): JsonBody<IngestItem>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = process_item(&service(&state), &item)?;
    Ok(created(outcome))
}

/// Batch ingest with per-item isolation: one malformed item is reported in
/// its slot and the rest of the batch still lands. Items are decoded one by
/// one so a shape error in a single element cannot reject its neighbours.
async fn ingest_batch(
    State(state): State<AppState>,
    JsonBody(items): JsonBody<Vec<serde_json::Value>>,
) -> Result<impl IntoResponse, AppError> {
    if items.len() > validation::MAX_BATCH_ITEMS {
        return Err(AppError::payload_too_large(&format!(
            "batch may contain at most {} items",
            validation::MAX_BATCH_ITEMS
        )));
    }

    let service = service(&state);
    let mut results = Vec::with_capacity(items.len());
    let mut accepted = 0usize;

    for value in items {
        let outcome = serde_json::from_value::<IngestItem>(value)
            .map_err(|err| AppError::bad_request("INVALID_ITEM", &err.to_string()))
            .and_then(|item| process_item(&service, &item));
        match outcome {
            Ok(outcome) => {
                accepted += 1;
                results.push(BatchItemResult {
                    accepted: true,
                    outcome: Some(outcome),
                    error: None,
                });
            }
            Err(err) => {
                results.push(BatchItemResult {
                    accepted: false,
                    outcome: None,
                    error: Some(err.message),
                });
            }
        }
    }

    let rejected = results.len() - accepted;
    Ok(ok(BatchResponse {
        accepted,
        rejected,
        results,
    }))
}
