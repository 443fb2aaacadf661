//! Event ingestion endpoint.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use crate::delta::{DeltaEvent, EventId};

use super::{HttpState, error::ApiError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct IngestRequest {
    /// Target environment; every environment when absent.
    #[serde(default)]
    environment: Option<String>,
    events: Vec<DeltaEvent>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestResponse {
    accepted: usize,
    caches_updated: usize,
    revision: EventId,
}

pub(super) async fn ingest_events(
    State(state): State<HttpState>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        ApiError::bad_request("invalid event payload", Some(rejection.body_text()))
    })?;

    let caches_updated = state
        .sync
        .ingest(request.environment.as_deref(), &request.events)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            accepted: request.events.len(),
            caches_updated,
            revision: state.sync.store().event_id(),
        }),
    ))
}
