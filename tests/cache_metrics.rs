use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use flagsync::application::sync::{SyncRequest, SyncService};
use flagsync::delta::{
    DeltaConfig, DeltaEvent, DeltaRegistry, ScopeKey, StateFile, StateStore,
};
use flagsync::domain::ClientFeature;
use metrics_util::debugging::DebuggingRecorder;

#[tokio::test]
async fn delta_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let mut environments = BTreeMap::new();
    environments.insert(
        "production".to_string(),
        vec![ClientFeature::new("checkout", "web")],
    );
    let store = StateStore::new(StateFile {
        event_id: 1,
        environments,
        segments: vec![],
    });
    let registry = DeltaRegistry::new(DeltaConfig::with_max_length(1));
    let service = SyncService::new(Arc::new(store), Arc::new(registry));
    let scope = ScopeKey::environment_wide("production");

    // Hydration creates the cache and reports registry size.
    service
        .sync(&SyncRequest::new(scope.clone()))
        .await
        .expect("hydrate");

    // A two-event batch into a one-event buffer evicts.
    service
        .ingest(
            Some("production"),
            &[
                DeltaEvent::feature_updated(2, ClientFeature::new("search", "web")),
                DeltaEvent::feature_removed(3, "checkout", "web"),
            ],
        )
        .await
        .expect("ingest");

    service
        .sync(&SyncRequest::new(scope).with_last_event_id(3))
        .await
        .expect("up to date");

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "flagsync_delta_events_total",
        "flagsync_delta_evicted_total",
        "flagsync_delta_fold_ms",
        "flagsync_delta_memory_bytes",
        "flagsync_registry_caches",
        "flagsync_sync_responses_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
