//! Per-scope cache registry.
//!
//! Each distinct [`ScopeKey`] owns exactly one [`DeltaCache`]. Caches are
//! created lazily from a [`HydrationSource`] and then kept current by routing
//! ingested batches to every cache whose scope can see them.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use metrics::gauge;
use tracing::{debug, info};

use super::cache::DeltaCache;
use super::config::DeltaConfig;
use super::events::DeltaEvent;
use super::keys::ScopeKey;
use super::source::{HydrationSource, SourceError};

const METRIC_MEMORY_BYTES: &str = "flagsync_delta_memory_bytes";
const METRIC_REGISTRY_CACHES: &str = "flagsync_registry_caches";

pub struct DeltaRegistry {
    config: DeltaConfig,
    caches: DashMap<ScopeKey, Arc<DeltaCache>>,
}

impl DeltaRegistry {
    pub fn new(config: DeltaConfig) -> Self {
        Self {
            config,
            caches: DashMap::new(),
        }
    }

    pub fn config(&self) -> &DeltaConfig {
        &self.config
    }

    pub fn get(&self, scope: &ScopeKey) -> Option<Arc<DeltaCache>> {
        self.caches.get(scope).map(|entry| Arc::clone(entry.value()))
    }

    /// The cache for `scope`, hydrating a new one on first access.
    ///
    /// When two callers race to create the same scope, the first insert wins
    /// and the other hydration is dropped.
    pub async fn get_or_hydrate(
        &self,
        scope: &ScopeKey,
        source: &dyn HydrationSource,
    ) -> Result<Arc<DeltaCache>, SourceError> {
        if let Some(cache) = self.get(scope) {
            return Ok(cache);
        }

        let hydration = source.hydrate(scope).await?;
        let revision = hydration.event_id;
        let feature_count = hydration.features.len();

        let (cache, created) = match self.caches.entry(scope.clone()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let cache = Arc::new(DeltaCache::new(hydration, &self.config));
                entry.insert(Arc::clone(&cache));
                (cache, true)
            }
        };

        if created {
            info!(
                scope = %scope,
                revision,
                feature_count,
                "Delta cache hydrated"
            );
            self.report_size();
        }

        Ok(cache)
    }

    /// Deliver a batch to every cache that can see it.
    ///
    /// Feature events are delivered to caches of `environment` (every
    /// environment for `None`) whose scope includes the feature's project.
    /// Segments are global, so segment events reach every cache. Returns the
    /// number of caches that received events.
    pub fn ingest(&self, environment: Option<&str>, events: &[DeltaEvent]) -> usize {
        if events.is_empty() {
            return 0;
        }

        let targets: Vec<(ScopeKey, Arc<DeltaCache>)> = self
            .caches
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut updated = 0;
        for (scope, cache) in targets {
            let in_environment = environment.is_none_or(|env| scope.environment() == env);
            let visible: Vec<DeltaEvent> = events
                .iter()
                .filter(|event| match event.project() {
                    Some(project) => in_environment && scope.includes_project(project),
                    None => true,
                })
                .cloned()
                .collect();
            if visible.is_empty() {
                continue;
            }
            cache.add_events(&visible);
            updated += 1;
        }

        debug!(
            environment = environment.unwrap_or("*"),
            event_count = events.len(),
            caches_updated = updated,
            "Delta batch routed"
        );
        self.report_footprint();

        updated
    }

    /// Deliver a batch to every environment.
    pub fn ingest_all(&self, events: &[DeltaEvent]) -> usize {
        self.ingest(None, events)
    }

    pub fn remove(&self, scope: &ScopeKey) -> bool {
        let removed = self.caches.remove(scope).is_some();
        if removed {
            self.report_size();
            self.report_footprint();
        }
        removed
    }

    pub fn clear(&self) {
        self.caches.clear();
        self.report_size();
        self.report_footprint();
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    /// Live scopes in sorted order.
    pub fn scopes(&self) -> Vec<ScopeKey> {
        let mut scopes: Vec<ScopeKey> = self.caches.iter().map(|e| e.key().clone()).collect();
        scopes.sort();
        scopes
    }

    /// Serialized size of every live cache, in bytes.
    pub fn footprint_bytes(&self) -> usize {
        self.caches
            .iter()
            .map(|entry| entry.value().footprint_bytes())
            .sum()
    }

    fn report_footprint(&self) {
        gauge!(METRIC_MEMORY_BYTES).set(self.footprint_bytes() as f64);
    }

    fn report_size(&self) {
        gauge!(METRIC_REGISTRY_CACHES).set(self.caches.len() as f64);
    }
}

impl Default for DeltaRegistry {
    fn default() -> Self {
        Self::new(DeltaConfig::default())
    }
}
