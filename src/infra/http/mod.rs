mod admin;
mod client;
pub mod error;
mod middleware;

use std::sync::Arc;

use axum::{
    Router,
    http::StatusCode,
    middleware as axum_middleware,
    routing::{get, post},
};

use crate::application::sync::SyncService;

pub use error::ApiError;

#[derive(Clone)]
pub struct HttpState {
    pub sync: Arc<SyncService>,
}

impl HttpState {
    pub fn new(sync: Arc<SyncService>) -> Self {
        Self { sync }
    }
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/api/client/delta", get(client::delta))
        .route("/api/client/features", get(client::features))
        .route("/api/admin/events", post(admin::ingest_events))
        .route("/health", get(health))
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}
