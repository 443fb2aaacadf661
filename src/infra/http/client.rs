//! SDK-facing endpoints.

use axum::{
    Json,
    extract::{Query, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{ETAG, IF_NONE_MATCH},
    },
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::{
    application::sync::SyncRequest,
    delta::{DEFAULT_ENVIRONMENT, EventId, ScopeKey},
};

use super::{HttpState, error::ApiError};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(super) struct ClientQuery {
    environment: Option<String>,
    /// Comma-separated project list; absent or `*` means every project.
    project: Option<String>,
    name_prefix: Option<String>,
}

impl ClientQuery {
    fn scope(&self) -> ScopeKey {
        let environment = self
            .environment
            .as_deref()
            .map(str::trim)
            .filter(|env| !env.is_empty())
            .unwrap_or(DEFAULT_ENVIRONMENT);
        let projects = self.project.as_deref().unwrap_or_default().split(',');
        ScopeKey::new(environment, projects)
    }

    fn name_prefix(&self) -> String {
        self.name_prefix.clone().unwrap_or_default()
    }
}

pub(super) async fn delta(
    State(state): State<HttpState>,
    Query(query): Query<ClientQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let request = SyncRequest {
        scope: query.scope(),
        last_event_id: if_none_match(&headers).and_then(|tag| tag.parse::<EventId>().ok()),
        name_prefix: query.name_prefix(),
    };

    let outcome = state.sync.sync(&request).await?;
    let etag = quoted(&outcome.revision().to_string());

    let response = match outcome.into_response() {
        None => StatusCode::NOT_MODIFIED.into_response(),
        Some(body) => Json(body).into_response(),
    };
    Ok(with_etag(response, &etag))
}

pub(super) async fn features(
    State(state): State<HttpState>,
    Query(query): Query<ClientQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let snapshot = state
        .sync
        .snapshot(&query.scope(), &query.name_prefix())
        .await?;
    let fingerprint = snapshot.fingerprint();
    let etag = quoted(&fingerprint);

    let response = if if_none_match(&headers).as_deref() == Some(fingerprint.as_str()) {
        StatusCode::NOT_MODIFIED.into_response()
    } else {
        Json(snapshot).into_response()
    };
    Ok(with_etag(response, &etag))
}

/// The entity tag a client sent, without weak prefix or quotes.
fn if_none_match(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(IF_NONE_MATCH)?.to_str().ok()?.trim();
    let raw = raw.strip_prefix("W/").unwrap_or(raw);
    let tag = raw.trim_matches('"');
    (!tag.is_empty()).then(|| tag.to_string())
}

fn quoted(tag: &str) -> String {
    format!("\"{tag}\"")
}

fn with_etag(mut response: Response, etag: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(etag) {
        response.headers_mut().insert(ETAG, value);
    }
    response
}
