//! The ingestion pipeline: validate, fingerprint, persist, detect, alert.
//! One failing item never poisons its batch; callers get a per-item result.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::engine::fingerprint::{origin_location, Fingerprinter};
use crate::engine::nplusone::{self, NPlusOneCandidate};
use crate::engine::types::{ErrorEventInput, PerfEventInput, QueryObservation};
use crate::services::alerting::AlertDispatcher;
use crate::store::operations::events::ErrorEvent;
use crate::store::operations::issues::OccurrenceAttrs;
use crate::store::operations::perf_events::PerfEvent;
use crate::store::{Store, StoreError};
use crate::validation;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorIngestOutcome {
    pub event_id: String,
    pub fingerprint: String,
    pub issue_created: bool,
    pub n_plus_one: Vec<NPlusOneCandidate>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfIngestOutcome {
    pub event_id: String,
    pub n_plus_one: Vec<NPlusOneCandidate>,
}

#[derive(Clone)]
pub struct IngestService {
    store: Arc<Store>,
    fingerprinter: Arc<Fingerprinter>,
    dispatcher: AlertDispatcher,
    engine: EngineConfig,
}

impl IngestService {
    pub fn new(
        store: Arc<Store>,
        fingerprinter: Arc<Fingerprinter>,
        dispatcher: AlertDispatcher,
        engine: EngineConfig,
    ) -> Self {
        Self {
            store,
            fingerprinter,
            dispatcher,
            engine,
        }
    }

    pub fn process_error_event(
        &self,
        input: &ErrorEventInput,
    ) -> Result<ErrorIngestOutcome, StoreError> {
        validate_error_input(input)?;

        let origin = origin_location(&input.frames);
        let fingerprint = self
            .fingerprinter
            .fingerprint(&input.kind, &origin, &input.call_path);

        let attrs = OccurrenceAttrs {
            kind: input.kind.clone(),
            origin: origin.clone(),
            call_path: input.call_path.clone(),
            message: validation::clamp_message(&input.message),
            occurred_at: input.occurred_at,
        };
        let (issue, created) =
            self.store
                .find_or_increment_issue(&input.project, &fingerprint, &attrs)?;

        let event = ErrorEvent {
            id: Uuid::new_v4().to_string(),
            project: input.project.clone(),
            fingerprint: fingerprint.clone(),
            kind: input.kind.clone(),
            message: attrs.message.clone(),
            frames: input.frames.iter().take(validation::MAX_FRAMES).cloned().collect(),
            call_path: input.call_path.clone(),
            occurred_at: input.occurred_at,
        };
        self.store.create_event(&event)?;

        let candidates =
            self.observe_queries(&input.project, &input.call_path, &input.queries, input)?;

        if created {
            self.dispatcher.issue_created(&issue)?;
        } else {
            self.dispatcher.issue_occurrence(&issue)?;
        }
        for candidate in &candidates {
            self.dispatcher
                .n_plus_one_detected(&input.project, &input.call_path, candidate)?;
        }

        Ok(ErrorIngestOutcome {
            event_id: event.id,
            fingerprint,
            issue_created: created,
            n_plus_one: candidates,
        })
    }

    pub fn process_perf_event(
        &self,
        input: &PerfEventInput,
    ) -> Result<PerfIngestOutcome, StoreError> {
        validate_perf_input(input)?;

        let event = PerfEvent {
            id: Uuid::new_v4().to_string(),
            project: input.project.clone(),
            target: input.target.clone(),
            duration_ms: input.duration_ms,
            error: input.error,
            occurred_at: input.occurred_at,
        };
        self.store.create_perf_event(&event)?;

        // The target doubles as the call-path label for query tracking.
        let candidates = self.observe_perf_queries(input)?;
        for candidate in &candidates {
            self.dispatcher
                .n_plus_one_detected(&input.project, &input.target, candidate)?;
        }

        Ok(PerfIngestOutcome {
            event_id: event.id,
            n_plus_one: candidates,
        })
    }

    fn observe_queries(
        &self,
        project: &str,
        call_path: &str,
        queries: &[QueryObservation],
        input: &ErrorEventInput,
    ) -> Result<Vec<NPlusOneCandidate>, StoreError> {
        for query in queries.iter().take(validation::MAX_QUERIES_PER_EVENT) {
            self.store.track_sql_fingerprint(
                project,
                call_path,
                &query.normalized,
                query.duration_ms,
                input.occurred_at,
            )?;
        }
        Ok(nplusone::detect(queries, self.engine.n_plus_one_threshold))
    }

    fn observe_perf_queries(
        &self,
        input: &PerfEventInput,
    ) -> Result<Vec<NPlusOneCandidate>, StoreError> {
        for query in input.queries.iter().take(validation::MAX_QUERIES_PER_EVENT) {
            self.store.track_sql_fingerprint(
                &input.project,
                &input.target,
                &query.normalized,
                query.duration_ms,
                input.occurred_at,
            )?;
        }
        Ok(nplusone::detect(&input.queries, self.engine.n_plus_one_threshold))
    }
}

fn validate_error_input(input: &ErrorEventInput) -> Result<(), StoreError> {
    validation::validate_project(&input.project)
        .map_err(|e| StoreError::Validation(e.to_string()))?;
    validation::validate_error_kind(&input.kind)
        .map_err(|e| StoreError::Validation(e.to_string()))?;
    if input.frames.len() > validation::MAX_FRAMES {
        tracing::debug!(
            frames = input.frames.len(),
            "Stack trace truncated at ingest"
        );
    }
    Ok(())
}

fn validate_perf_input(input: &PerfEventInput) -> Result<(), StoreError> {
    validation::validate_project(&input.project)
        .map_err(|e| StoreError::Validation(e.to_string()))?;
    validation::validate_target(&input.target)
        .map_err(|e| StoreError::Validation(e.to_string()))?;
    validation::validate_duration_ms(input.duration_ms)
        .map_err(|e| StoreError::Validation(e.to_string()))?;
    Ok(())
}
