//! The delta cache: a bounded replay buffer layered over a full snapshot.
//!
//! Writers build the next [`DeltaState`] off to the side and publish it with
//! a single pointer swap. Readers clone the current `Arc` and never observe a
//! half-applied batch.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use metrics::{counter, histogram};
use serde::Serialize;
use tracing::{debug, warn};

use super::config::DeltaConfig;
use super::events::{DeltaEvent, EventId, HydrationEvent};
use super::lock::{mutex_lock, rw_read, rw_write};

const SOURCE: &str = "delta::cache";

const METRIC_EVENTS_TOTAL: &str = "flagsync_delta_events_total";
const METRIC_EVICTED_TOTAL: &str = "flagsync_delta_evicted_total";
const METRIC_FOLD_MS: &str = "flagsync_delta_fold_ms";

/// One immutable, internally consistent view of a delta cache.
#[derive(Debug, Clone, Serialize)]
pub struct DeltaState {
    hydration: HydrationEvent,
    events: VecDeque<DeltaEvent>,
}

impl DeltaState {
    fn seeded(hydration: HydrationEvent) -> Self {
        let events = hydration.seed_event().into_iter().collect();
        Self { hydration, events }
    }

    pub fn hydration(&self) -> &HydrationEvent {
        &self.hydration
    }

    /// Retained events, oldest first.
    pub fn events(&self) -> &VecDeque<DeltaEvent> {
        &self.events
    }

    /// Id of the last event folded into the snapshot.
    pub fn revision(&self) -> EventId {
        self.hydration.event_id
    }

    /// True when no retained event carries exactly `revision_id`.
    ///
    /// A client whose last id is missing cannot be caught up incrementally
    /// and must be sent the full hydration instead.
    pub fn is_missing_revision(&self, revision_id: EventId) -> bool {
        !self.events.iter().any(|e| e.event_id() == revision_id)
    }

    /// Retained events strictly newer than `revision_id`, oldest first.
    pub fn events_since(&self, revision_id: EventId) -> Vec<DeltaEvent> {
        self.events
            .iter()
            .filter(|e| e.event_id() > revision_id)
            .cloned()
            .collect()
    }
}

/// Bounded log of recent events plus the snapshot they have been folded into.
pub struct DeltaCache {
    max_length: NonZeroUsize,
    state: RwLock<Arc<DeltaState>>,
    writer: Mutex<()>,
}

impl DeltaCache {
    /// Create a cache from an initial hydration.
    ///
    /// The buffer is seeded with one synthetic event at the hydration's id so
    /// that clients which just received this hydration can be replayed from
    /// it. See [`HydrationEvent::seed_event`].
    pub fn new(hydration: HydrationEvent, config: &DeltaConfig) -> Self {
        Self {
            max_length: config.max_length_non_zero(),
            state: RwLock::new(Arc::new(DeltaState::seeded(hydration))),
            writer: Mutex::new(()),
        }
    }

    /// Append `events` and fold each into the snapshot, then evict the oldest
    /// events beyond the configured bound.
    ///
    /// Events must already be ordered by id. They are applied as given; an id
    /// lower than its predecessor is logged but never reordered.
    pub fn add_events(&self, events: &[DeltaEvent]) {
        if events.is_empty() {
            return;
        }

        let started_at = Instant::now();
        let _writer = mutex_lock(&self.writer, SOURCE, "add_events");

        let mut next = DeltaState::clone(&self.state());
        let mut last_seen = next.revision();

        for event in events {
            let event_id = event.event_id();
            if event_id < last_seen {
                warn!(
                    event_id,
                    previous_event_id = last_seen,
                    event_kind = event.kind(),
                    "Delta event arrived out of order"
                );
            }
            next.events.push_back(event.clone());
            next.hydration.apply(event);
            last_seen = event_id;
        }

        let mut evicted = 0u64;
        while next.events.len() > self.max_length.get() {
            next.events.pop_front();
            evicted += 1;
        }

        let revision = next.revision();
        let retained = next.events.len();
        *rw_write(&self.state, SOURCE, "add_events.publish") = Arc::new(next);

        counter!(METRIC_EVENTS_TOTAL).increment(events.len() as u64);
        if evicted > 0 {
            counter!(METRIC_EVICTED_TOTAL).increment(evicted);
        }
        histogram!(METRIC_FOLD_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        debug!(
            event_count = events.len(),
            evicted,
            retained,
            revision,
            "Delta events applied"
        );
    }

    /// Current state. Holding the returned `Arc` keeps that view stable while
    /// writers move on.
    pub fn state(&self) -> Arc<DeltaState> {
        Arc::clone(&rw_read(&self.state, SOURCE, "state"))
    }

    pub fn get_events(&self) -> Vec<DeltaEvent> {
        self.state().events.iter().cloned().collect()
    }

    pub fn is_missing_revision(&self, revision_id: EventId) -> bool {
        self.state().is_missing_revision(revision_id)
    }

    pub fn get_hydration_event(&self) -> HydrationEvent {
        self.state().hydration.clone()
    }

    pub fn events_since(&self, revision_id: EventId) -> Vec<DeltaEvent> {
        self.state().events_since(revision_id)
    }

    pub fn revision(&self) -> EventId {
        self.state().revision()
    }

    pub fn max_length(&self) -> usize {
        self.max_length.get()
    }

    /// Serialized size of the retained state in bytes.
    pub fn footprint_bytes(&self) -> usize {
        serde_json::to_vec(&*self.state())
            .map(|bytes| bytes.len())
            .unwrap_or_default()
    }
}
