//! Delta events and the hydration snapshot they fold into.
//!
//! Every mutation of a flag or segment definition reaches the engine as one
//! [`DeltaEvent`]. A [`HydrationEvent`] is the materialized sum of a base
//! snapshot and every event folded into it since, kept in a canonical order.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{ClientFeature, ClientSegment};

/// Identifier assigned to a mutation by the event source.
///
/// Ids increase strictly across the process; the engine never assigns or
/// renumbers them.
pub type EventId = u64;

/// One atomic change to the distributed definitions.
///
/// On the wire this is tagged with a `type` field so SDKs can dispatch on it:
///
/// ```json
/// {"type":"feature-removed","eventId":42,"featureName":"checkout","project":"web"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DeltaEvent {
    #[serde(rename_all = "camelCase")]
    FeatureUpdated {
        event_id: EventId,
        feature: ClientFeature,
    },
    #[serde(rename_all = "camelCase")]
    FeatureRemoved {
        event_id: EventId,
        feature_name: String,
        project: String,
    },
    #[serde(rename_all = "camelCase")]
    SegmentUpdated {
        event_id: EventId,
        segment: ClientSegment,
    },
    #[serde(rename_all = "camelCase")]
    SegmentRemoved { event_id: EventId, segment_id: i64 },
}

impl DeltaEvent {
    pub fn feature_updated(event_id: EventId, feature: ClientFeature) -> Self {
        Self::FeatureUpdated { event_id, feature }
    }

    pub fn feature_removed(
        event_id: EventId,
        feature_name: impl Into<String>,
        project: impl Into<String>,
    ) -> Self {
        Self::FeatureRemoved {
            event_id,
            feature_name: feature_name.into(),
            project: project.into(),
        }
    }

    pub fn segment_updated(event_id: EventId, segment: ClientSegment) -> Self {
        Self::SegmentUpdated { event_id, segment }
    }

    pub fn segment_removed(event_id: EventId, segment_id: i64) -> Self {
        Self::SegmentRemoved {
            event_id,
            segment_id,
        }
    }

    pub fn event_id(&self) -> EventId {
        match self {
            Self::FeatureUpdated { event_id, .. }
            | Self::FeatureRemoved { event_id, .. }
            | Self::SegmentUpdated { event_id, .. }
            | Self::SegmentRemoved { event_id, .. } => *event_id,
        }
    }

    /// Wire discriminator, also used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FeatureUpdated { .. } => "feature-updated",
            Self::FeatureRemoved { .. } => "feature-removed",
            Self::SegmentUpdated { .. } => "segment-updated",
            Self::SegmentRemoved { .. } => "segment-removed",
        }
    }

    /// Name of the feature this event touches, if it is a feature event.
    pub fn feature_name(&self) -> Option<&str> {
        match self {
            Self::FeatureUpdated { feature, .. } => Some(&feature.name),
            Self::FeatureRemoved { feature_name, .. } => Some(feature_name),
            Self::SegmentUpdated { .. } | Self::SegmentRemoved { .. } => None,
        }
    }

    /// Project owning the touched feature. Segments are not project scoped.
    pub fn project(&self) -> Option<&str> {
        match self {
            Self::FeatureUpdated { feature, .. } => Some(&feature.project),
            Self::FeatureRemoved { project, .. } => Some(project),
            Self::SegmentUpdated { .. } | Self::SegmentRemoved { .. } => None,
        }
    }

    pub fn is_segment_event(&self) -> bool {
        matches!(
            self,
            Self::SegmentUpdated { .. } | Self::SegmentRemoved { .. }
        )
    }
}

/// Full state of every feature and segment as of `event_id`.
///
/// Features are kept sorted by name and segments by name then id after every
/// mutation, so equal snapshots always serialize to identical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "hydration", rename_all = "camelCase")]
pub struct HydrationEvent {
    pub event_id: EventId,
    pub features: Vec<ClientFeature>,
    pub segments: Vec<ClientSegment>,
}

impl HydrationEvent {
    pub fn new(
        event_id: EventId,
        features: Vec<ClientFeature>,
        segments: Vec<ClientSegment>,
    ) -> Self {
        let mut hydration = Self {
            event_id,
            features,
            segments,
        };
        hydration.sort();
        hydration
    }

    pub fn empty(event_id: EventId) -> Self {
        Self::new(event_id, Vec::new(), Vec::new())
    }

    /// Fold one event into the snapshot.
    ///
    /// The watermark moves to the event's id even when the event changes
    /// nothing, and the collections are re-sorted before returning.
    pub fn apply(&mut self, event: &DeltaEvent) {
        match event {
            DeltaEvent::FeatureUpdated { feature, .. } => {
                match self.features.iter_mut().find(|f| f.name == feature.name) {
                    Some(existing) => *existing = feature.clone(),
                    None => self.features.push(feature.clone()),
                }
            }
            DeltaEvent::FeatureRemoved { feature_name, .. } => {
                self.features.retain(|f| &f.name != feature_name);
            }
            DeltaEvent::SegmentUpdated { segment, .. } => {
                match self.segments.iter_mut().find(|s| s.id == segment.id) {
                    Some(existing) => *existing = segment.clone(),
                    None => self.segments.push(segment.clone()),
                }
            }
            DeltaEvent::SegmentRemoved { segment_id, .. } => {
                self.segments.retain(|s| s.id != *segment_id);
            }
        }

        self.event_id = event.event_id();
        self.sort();
    }

    /// Copy of this snapshot holding only the features accepted by `keep`.
    pub fn filter_features<F>(&self, keep: F) -> Self
    where
        F: Fn(&ClientFeature) -> bool,
    {
        Self {
            event_id: self.event_id,
            features: self.features.iter().filter(|f| keep(*f)).cloned().collect(),
            segments: self.segments.clone(),
        }
    }

    /// Hex sha256 over the serialized snapshot, used as an etag downstream.
    pub fn fingerprint(&self) -> String {
        // These types contain no maps with non-string keys, so serialization
        // cannot fail.
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        hex::encode(hasher.finalize())
    }

    /// The event a fresh delta cache seeds its buffer with.
    ///
    /// This is the last feature in canonical order re-issued at the
    /// snapshot's own id, falling back to the last segment when there are no
    /// features.
    pub fn seed_event(&self) -> Option<DeltaEvent> {
        if let Some(feature) = self.features.last() {
            return Some(DeltaEvent::feature_updated(self.event_id, feature.clone()));
        }
        self.segments
            .last()
            .map(|segment| DeltaEvent::segment_updated(self.event_id, segment.clone()))
    }

    fn sort(&mut self) {
        self.features.sort_by(|a, b| a.name.cmp(&b.name));
        self.segments
            .sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(hydration: &HydrationEvent) -> Vec<&str> {
        hydration.features.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = DeltaEvent::feature_removed(42, "checkout", "web");
        let json = serde_json::to_string(&event).expect("serialize");
        assert_eq!(
            json,
            r#"{"type":"feature-removed","eventId":42,"featureName":"checkout","project":"web"}"#
        );
    }

    #[test]
    fn event_deserializes_segment_removed() {
        let event: DeltaEvent =
            serde_json::from_str(r#"{"type":"segment-removed","eventId":7,"segmentId":3}"#)
                .expect("deserialize");
        assert_eq!(event, DeltaEvent::segment_removed(7, 3));
        assert_eq!(event.kind(), "segment-removed");
        assert!(event.is_segment_event());
        assert!(event.project().is_none());
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let result =
            serde_json::from_str::<DeltaEvent>(r#"{"type":"feature-archived","eventId":1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn new_sorts_collections() {
        let hydration = HydrationEvent::new(
            1,
            vec![ClientFeature::new("b", "p"), ClientFeature::new("a", "p")],
            vec![
                ClientSegment::new(9, "beta"),
                ClientSegment::new(2, "alpha"),
                ClientSegment::new(1, "beta"),
            ],
        );

        assert_eq!(names(&hydration), vec!["a", "b"]);
        let segments: Vec<i64> = hydration.segments.iter().map(|s| s.id).collect();
        assert_eq!(segments, vec![2, 1, 9]);
    }

    #[test]
    fn apply_upserts_feature_in_place() {
        let mut hydration = HydrationEvent::new(1, vec![ClientFeature::new("a", "p")], vec![]);

        hydration.apply(&DeltaEvent::feature_updated(
            2,
            ClientFeature::new("a", "p").with_enabled(false),
        ));

        assert_eq!(hydration.features.len(), 1);
        assert!(!hydration.features[0].enabled);
        assert_eq!(hydration.event_id, 2);
    }

    #[test]
    fn apply_noop_removal_still_advances_watermark() {
        let mut hydration = HydrationEvent::empty(5);
        hydration.apply(&DeltaEvent::feature_removed(6, "missing", "p"));
        assert_eq!(hydration.event_id, 6);
        assert!(hydration.features.is_empty());
    }

    #[test]
    fn apply_segment_update_and_remove() {
        let mut hydration = HydrationEvent::empty(1);
        hydration.apply(&DeltaEvent::segment_updated(2, ClientSegment::new(4, "zeta")));
        hydration.apply(&DeltaEvent::segment_updated(3, ClientSegment::new(1, "alpha")));
        hydration.apply(&DeltaEvent::segment_updated(4, ClientSegment::new(4, "beta")));

        let labels: Vec<(&str, i64)> = hydration
            .segments
            .iter()
            .map(|s| (s.name.as_str(), s.id))
            .collect();
        assert_eq!(labels, vec![("alpha", 1), ("beta", 4)]);

        hydration.apply(&DeltaEvent::segment_removed(5, 4));
        assert_eq!(hydration.segments.len(), 1);
        assert_eq!(hydration.event_id, 5);
    }

    #[test]
    fn hydration_serializes_with_tag() {
        let json = serde_json::to_string(&HydrationEvent::empty(3)).expect("serialize");
        assert_eq!(
            json,
            r#"{"type":"hydration","eventId":3,"features":[],"segments":[]}"#
        );
    }

    #[test]
    fn fingerprint_ignores_insertion_order() {
        let left = HydrationEvent::new(
            4,
            vec![ClientFeature::new("a", "p"), ClientFeature::new("b", "p")],
            vec![],
        );
        let right = HydrationEvent::new(
            4,
            vec![ClientFeature::new("b", "p"), ClientFeature::new("a", "p")],
            vec![],
        );
        assert_eq!(left.fingerprint(), right.fingerprint());
        assert_eq!(left.fingerprint().len(), 64);

        let changed = HydrationEvent::new(5, vec![ClientFeature::new("a", "p")], vec![]);
        assert_ne!(left.fingerprint(), changed.fingerprint());
    }

    #[test]
    fn seed_event_prefers_last_feature() {
        let hydration = HydrationEvent::new(
            9,
            vec![ClientFeature::new("z", "p"), ClientFeature::new("a", "p")],
            vec![ClientSegment::new(1, "s")],
        );
        let seed = hydration.seed_event().expect("seed");
        assert_eq!(seed.event_id(), 9);
        assert_eq!(seed.feature_name(), Some("z"));

        let segments_only = HydrationEvent::new(3, vec![], vec![ClientSegment::new(1, "s")]);
        let seed = segments_only.seed_event().expect("segment seed");
        assert!(seed.is_segment_event());

        assert!(HydrationEvent::empty(1).seed_event().is_none());
    }
}
