//! Client sync decisions and response shaping.
//!
//! Given one consistent [`DeltaState`] and what a client last saw, decide
//! whether it is up to date, can be replayed incrementally, or needs a full
//! hydration.

use serde::Serialize;

use super::cache::DeltaState;
use super::events::{DeltaEvent, EventId, HydrationEvent};

/// What to send a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The client already holds `revision`.
    UpToDate { revision: EventId },
    /// The client's gap cannot be closed from the buffer.
    Hydration(HydrationEvent),
    /// Replay `events` to move the client to `revision`.
    Delta {
        revision: EventId,
        events: Vec<DeltaEvent>,
    },
}

impl SyncOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::UpToDate { .. } => "up_to_date",
            Self::Hydration(_) => "hydration",
            Self::Delta { .. } => "delta",
        }
    }

    /// Revision the client holds after applying this outcome.
    pub fn revision(&self) -> EventId {
        match self {
            Self::UpToDate { revision } | Self::Delta { revision, .. } => *revision,
            Self::Hydration(hydration) => hydration.event_id,
        }
    }

    /// Wire body, or `None` when there is nothing to send.
    pub fn into_response(self) -> Option<DeltaResponse> {
        match self {
            Self::UpToDate { .. } => None,
            Self::Hydration(hydration) => Some(DeltaResponse {
                events: vec![ClientEvent::Hydration(hydration)],
            }),
            Self::Delta { events, .. } => Some(DeltaResponse {
                events: events.into_iter().map(ClientEvent::Change).collect(),
            }),
        }
    }
}

/// Element of a delta response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ClientEvent {
    Hydration(HydrationEvent),
    Change(DeltaEvent),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeltaResponse {
    pub events: Vec<ClientEvent>,
}

/// Events newer than `after` that a client filtering on `name_prefix` needs.
///
/// Segment events are always kept since strategies in any visible feature
/// may reference them.
pub fn filter_events<'a, I>(events: I, after: EventId, name_prefix: &str) -> Vec<DeltaEvent>
where
    I: IntoIterator<Item = &'a DeltaEvent>,
{
    events
        .into_iter()
        .filter(|event| event.event_id() > after)
        .filter(|event| match event.feature_name() {
            Some(name) => name.starts_with(name_prefix),
            None => true,
        })
        .cloned()
        .collect()
}

/// The hydration narrowed to features whose names start with `name_prefix`.
pub fn filter_hydration(hydration: &HydrationEvent, name_prefix: &str) -> HydrationEvent {
    if name_prefix.is_empty() {
        return hydration.clone();
    }
    hydration.filter_features(|feature| feature.name.starts_with(name_prefix))
}

/// Decide what a client that last saw `last_event_id` should receive.
///
/// - no id (or id 0): full hydration
/// - id equal to the current revision: nothing
/// - id not present in the buffer: full hydration
/// - otherwise: the retained events after that id
pub fn resolve(state: &DeltaState, last_event_id: Option<EventId>, name_prefix: &str) -> SyncOutcome {
    let revision = state.revision();

    let Some(last) = last_event_id.filter(|id| *id > 0) else {
        return SyncOutcome::Hydration(filter_hydration(state.hydration(), name_prefix));
    };

    if last == revision {
        return SyncOutcome::UpToDate { revision };
    }

    if state.is_missing_revision(last) {
        return SyncOutcome::Hydration(filter_hydration(state.hydration(), name_prefix));
    }

    SyncOutcome::Delta {
        revision,
        events: filter_events(state.events(), last, name_prefix),
    }
}
