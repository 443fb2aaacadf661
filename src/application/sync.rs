//! Client synchronization service.
//!
//! Binds the state store (source of hydrations) to the delta registry (per
//! scope caches) and answers client sync requests from them.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::application::error::AppError;
use crate::delta::{
    DeltaCache, DeltaEvent, DeltaRegistry, EventId, HydrationEvent, ScopeKey, StateStore,
    SyncOutcome, filter_hydration, resolve,
};

const METRIC_SYNC_RESPONSES_TOTAL: &str = "flagsync_sync_responses_total";

/// What a client knows and which part of the state it wants.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub scope: ScopeKey,
    pub last_event_id: Option<EventId>,
    pub name_prefix: String,
}

impl SyncRequest {
    pub fn new(scope: ScopeKey) -> Self {
        Self {
            scope,
            last_event_id: None,
            name_prefix: String::new(),
        }
    }

    pub fn with_last_event_id(mut self, last_event_id: EventId) -> Self {
        self.last_event_id = Some(last_event_id);
        self
    }

    pub fn with_name_prefix(mut self, name_prefix: impl Into<String>) -> Self {
        self.name_prefix = name_prefix.into();
        self
    }
}

pub struct SyncService {
    store: Arc<StateStore>,
    registry: Arc<DeltaRegistry>,
    // Serializes cache creation against ingestion so a cache hydrated from
    // the store never misses a batch applied while it was being built.
    gate: Mutex<()>,
}

impl SyncService {
    pub fn new(store: Arc<StateStore>, registry: Arc<DeltaRegistry>) -> Self {
        Self {
            store,
            registry,
            gate: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<DeltaRegistry> {
        &self.registry
    }

    /// Decide what the client should receive next.
    #[instrument(
        skip(self, request),
        fields(scope = %request.scope, last_event_id = ?request.last_event_id)
    )]
    pub async fn sync(&self, request: &SyncRequest) -> Result<SyncOutcome, AppError> {
        let cache = self.cache(&request.scope).await?;
        let state = cache.state();
        let outcome = resolve(&state, request.last_event_id, &request.name_prefix);

        counter!(METRIC_SYNC_RESPONSES_TOTAL, "outcome" => outcome.label()).increment(1);
        debug!(
            outcome = outcome.label(),
            revision = outcome.revision(),
            "Sync request resolved"
        );

        Ok(outcome)
    }

    /// Full snapshot for a scope, narrowed to `name_prefix`.
    #[instrument(skip(self, scope), fields(scope = %scope))]
    pub async fn snapshot(
        &self,
        scope: &ScopeKey,
        name_prefix: &str,
    ) -> Result<HydrationEvent, AppError> {
        let cache = self.cache(scope).await?;
        Ok(filter_hydration(cache.state().hydration(), name_prefix))
    }

    /// Apply a batch to the store and every cache that can see it.
    ///
    /// Ids within the batch must not decrease. Returns the number of caches
    /// that received events.
    #[instrument(skip(self, events), fields(event_count = events.len()))]
    pub async fn ingest(
        &self,
        environment: Option<&str>,
        events: &[DeltaEvent],
    ) -> Result<usize, AppError> {
        if events.is_empty() {
            return Ok(0);
        }
        if let Some(pair) = events
            .windows(2)
            .find(|pair| pair[1].event_id() < pair[0].event_id())
        {
            return Err(AppError::validation(format!(
                "event ids must not decrease: {} followed by {}",
                pair[0].event_id(),
                pair[1].event_id()
            )));
        }

        let _gate = self.gate.lock().await;
        self.store.apply(environment, events);
        let updated = self.registry.ingest(environment, events);

        info!(
            environment = environment.unwrap_or("*"),
            caches_updated = updated,
            revision = self.store.event_id(),
            "Delta batch ingested"
        );

        Ok(updated)
    }

    async fn cache(&self, scope: &ScopeKey) -> Result<Arc<DeltaCache>, AppError> {
        if let Some(cache) = self.registry.get(scope) {
            return Ok(cache);
        }

        let _gate = self.gate.lock().await;
        let cache = self
            .registry
            .get_or_hydrate(scope, self.store.as_ref())
            .await?;
        Ok(cache)
    }
}
