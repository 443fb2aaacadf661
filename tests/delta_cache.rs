use flagsync::delta::{DeltaCache, DeltaConfig, DeltaEvent, EventId, HydrationEvent};
use flagsync::domain::{ClientFeature, ClientSegment, Strategy};

fn feature(name: &str) -> ClientFeature {
    ClientFeature::new(name, "web")
}

fn ids(events: &[DeltaEvent]) -> Vec<EventId> {
    events.iter().map(DeltaEvent::event_id).collect()
}

fn names(hydration: &HydrationEvent) -> Vec<String> {
    hydration.features.iter().map(|f| f.name.clone()).collect()
}

#[test]
fn single_update_is_appended_after_seed() {
    let cache = DeltaCache::new(
        HydrationEvent::new(5, vec![feature("f1")], vec![]),
        &DeltaConfig::with_max_length(20),
    );

    cache.add_events(&[DeltaEvent::feature_updated(6, feature("f2"))]);

    assert_eq!(ids(&cache.get_events()), vec![5, 6]);
    let hydration = cache.get_hydration_event();
    assert_eq!(hydration.event_id, 6);
    assert_eq!(names(&hydration), vec!["f1", "f2"]);
    assert!(hydration.segments.is_empty());
}

#[test]
fn small_buffer_keeps_only_newest_events() {
    let cache = DeltaCache::new(
        HydrationEvent::new(0, vec![feature("seed")], vec![]),
        &DeltaConfig::with_max_length(2),
    );

    for id in 1..=5 {
        cache.add_events(&[DeltaEvent::feature_updated(id, feature(&format!("f{id}")))]);
    }

    assert_eq!(ids(&cache.get_events()), vec![4, 5]);
    assert!(cache.is_missing_revision(3));
    assert!(!cache.is_missing_revision(5));
}

#[test]
fn update_then_remove_leaves_no_feature() {
    let cache = DeltaCache::new(HydrationEvent::empty(0), &DeltaConfig::default());

    cache.add_events(&[DeltaEvent::feature_updated(1, feature("a"))]);
    cache.add_events(&[DeltaEvent::feature_removed(2, "a", "web")]);

    assert!(!names(&cache.get_hydration_event()).contains(&"a".to_string()));
}

#[test]
fn buffer_never_exceeds_bound() {
    let cache = DeltaCache::new(
        HydrationEvent::new(0, vec![feature("seed")], vec![]),
        &DeltaConfig::with_max_length(4),
    );

    let mut next_id = 1;
    for batch_size in [1usize, 3, 7, 2, 9] {
        let batch: Vec<DeltaEvent> = (0..batch_size)
            .map(|offset| {
                DeltaEvent::feature_updated(next_id + offset as EventId, feature("hot"))
            })
            .collect();
        next_id += batch_size as EventId;
        cache.add_events(&batch);

        assert!(cache.get_events().len() <= 4);
        assert_eq!(cache.revision(), next_id - 1);
    }
}

#[test]
fn watermark_follows_last_event_even_without_change() {
    let cache = DeltaCache::new(HydrationEvent::empty(10), &DeltaConfig::default());

    cache.add_events(&[DeltaEvent::feature_removed(11, "missing", "web")]);
    assert_eq!(cache.revision(), 11);

    cache.add_events(&[DeltaEvent::segment_removed(12, 99)]);
    assert_eq!(cache.revision(), 12);
    assert!(cache.get_hydration_event().features.is_empty());
}

#[test]
fn repeated_updates_converge_to_last_payload() {
    let cache = DeltaCache::new(HydrationEvent::empty(0), &DeltaConfig::default());

    cache.add_events(&[
        DeltaEvent::feature_updated(1, feature("x").with_enabled(true)),
        DeltaEvent::feature_updated(2, feature("x").with_enabled(false)),
    ]);

    let hydration = cache.get_hydration_event();
    assert_eq!(hydration.features.len(), 1);
    assert!(!hydration.features[0].enabled);
}

#[test]
fn segments_upsert_by_id_and_sort_by_name() {
    let cache = DeltaCache::new(HydrationEvent::empty(0), &DeltaConfig::default());

    cache.add_events(&[
        DeltaEvent::segment_updated(1, ClientSegment::new(2, "zeta")),
        DeltaEvent::segment_updated(2, ClientSegment::new(1, "alpha")),
        DeltaEvent::segment_updated(3, ClientSegment::new(2, "beta")),
    ]);

    let segments: Vec<(i64, String)> = cache
        .get_hydration_event()
        .segments
        .into_iter()
        .map(|s| (s.id, s.name))
        .collect();
    assert_eq!(
        segments,
        vec![(1, "alpha".to_string()), (2, "beta".to_string())]
    );
}

#[test]
fn missing_revision_matches_retained_ids() {
    let cache = DeltaCache::new(
        HydrationEvent::new(1, vec![feature("seed")], vec![]),
        &DeltaConfig::with_max_length(3),
    );
    cache.add_events(&[
        DeltaEvent::feature_updated(3, feature("a")),
        DeltaEvent::feature_updated(6, feature("b")),
    ]);

    for id in 0..8 {
        let retained = [1, 3, 6].contains(&id);
        assert_eq!(cache.is_missing_revision(id), !retained, "id {id}");
    }
}

#[test]
fn equal_snapshots_serialize_identically() {
    let alpha = feature("alpha").with_strategy(
        Strategy::new("flexibleRollout")
            .with_parameter("zeta", "1")
            .with_parameter("alpha", "2"),
    );
    let segment = ClientSegment::new(1, "beta");

    let direct = HydrationEvent::new(
        3,
        vec![feature("beta"), alpha.clone()],
        vec![segment.clone()],
    );

    let cache = DeltaCache::new(HydrationEvent::empty(0), &DeltaConfig::default());
    cache.add_events(&[
        DeltaEvent::feature_updated(1, alpha),
        DeltaEvent::segment_updated(2, segment),
        DeltaEvent::feature_updated(3, feature("beta")),
    ]);
    let folded = cache.get_hydration_event();

    let direct_json = serde_json::to_string(&direct).expect("serialize direct");
    let folded_json = serde_json::to_string(&folded).expect("serialize folded");
    assert_eq!(direct_json, folded_json);
    assert_eq!(direct.fingerprint(), folded.fingerprint());

    insta::assert_snapshot!(folded_json, @r#"{"type":"hydration","eventId":3,"features":[{"name":"alpha","type":"release","project":"web","enabled":true,"stale":false,"impressionData":false,"strategies":[{"name":"flexibleRollout","parameters":{"alpha":"2","zeta":"1"},"constraints":[]}],"variants":[]},{"name":"beta","type":"release","project":"web","enabled":true,"stale":false,"impressionData":false,"strategies":[],"variants":[]}],"segments":[{"id":1,"name":"beta","constraints":[]}]}"#);
}

#[test]
fn events_round_trip_through_wire_format() {
    let raw = r#"[
        {"type":"feature-updated","eventId":1,"feature":{"name":"a","project":"web","enabled":true}},
        {"type":"feature-removed","eventId":2,"featureName":"a","project":"web"},
        {"type":"segment-updated","eventId":3,"segment":{"id":4,"name":"beta","constraints":[]}},
        {"type":"segment-removed","eventId":4,"segmentId":4}
    ]"#;
    let events: Vec<DeltaEvent> = serde_json::from_str(raw).expect("parse events");

    let kinds: Vec<&str> = events.iter().map(DeltaEvent::kind).collect();
    assert_eq!(
        kinds,
        vec![
            "feature-updated",
            "feature-removed",
            "segment-updated",
            "segment-removed"
        ]
    );

    let cache = DeltaCache::new(HydrationEvent::empty(0), &DeltaConfig::default());
    cache.add_events(&events);
    let hydration = cache.get_hydration_event();
    assert_eq!(hydration.event_id, 4);
    assert!(hydration.features.is_empty());
    assert!(hydration.segments.is_empty());
}
