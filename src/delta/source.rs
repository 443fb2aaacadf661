//! Hydration sources.
//!
//! A delta cache is built from one full snapshot. [`HydrationSource`] is the
//! seam that supplies it; [`StateStore`] is the in-process implementation
//! backed by a JSON state file and kept current by the same events the caches
//! receive.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::events::{DeltaEvent, EventId, HydrationEvent};
use super::keys::ScopeKey;
use super::lock::{rw_read, rw_write};
use crate::domain::{ClientFeature, ClientSegment};

const SOURCE: &str = "delta::source";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("unknown environment `{environment}`")]
    UnknownEnvironment { environment: String },
    #[error("failed to read state file `{path}`")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse state file `{path}`")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Supplies the full snapshot a new delta cache starts from.
#[async_trait]
pub trait HydrationSource: Send + Sync {
    async fn hydrate(&self, scope: &ScopeKey) -> Result<HydrationEvent, SourceError>;
}

/// On-disk layout of the state file.
///
/// ```json
/// {"eventId": 12, "environments": {"production": [...]}, "segments": [...]}
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StateFile {
    pub event_id: EventId,
    pub environments: BTreeMap<String, Vec<ClientFeature>>,
    pub segments: Vec<ClientSegment>,
}

/// Full per-environment feature state plus the global segment list.
pub struct StateStore {
    state: RwLock<StateFile>,
}

impl StateStore {
    pub fn new(state: StateFile) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    pub async fn from_file(path: &Path) -> Result<Self, SourceError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| SourceError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let state: StateFile =
            serde_json::from_slice(&bytes).map_err(|source| SourceError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        info!(
            path = %path.display(),
            event_id = state.event_id,
            environments = state.environments.len(),
            segments = state.segments.len(),
            "Loaded state file"
        );

        Ok(Self::new(state))
    }

    /// Fold a batch into the stored state.
    ///
    /// Feature events land in `environment`, creating it when absent, or in
    /// every known environment when `environment` is `None`. Segment events
    /// are global.
    pub fn apply(&self, environment: Option<&str>, events: &[DeltaEvent]) {
        if events.is_empty() {
            return;
        }

        let mut state = rw_write(&self.state, SOURCE, "apply");
        for event in events {
            match event {
                DeltaEvent::FeatureUpdated { feature, .. } => {
                    for features in target_environments(&mut state.environments, environment) {
                        match features.iter_mut().find(|f| f.name == feature.name) {
                            Some(existing) => *existing = feature.clone(),
                            None => features.push(feature.clone()),
                        }
                    }
                }
                DeltaEvent::FeatureRemoved { feature_name, .. } => {
                    for features in target_environments(&mut state.environments, environment) {
                        features.retain(|f| &f.name != feature_name);
                    }
                }
                DeltaEvent::SegmentUpdated { segment, .. } => {
                    match state.segments.iter_mut().find(|s| s.id == segment.id) {
                        Some(existing) => *existing = segment.clone(),
                        None => state.segments.push(segment.clone()),
                    }
                }
                DeltaEvent::SegmentRemoved { segment_id, .. } => {
                    state.segments.retain(|s| s.id != *segment_id);
                }
            }
            state.event_id = event.event_id();
        }

        debug!(
            environment = environment.unwrap_or("*"),
            event_count = events.len(),
            event_id = state.event_id,
            "State store updated"
        );
    }

    pub fn event_id(&self) -> EventId {
        rw_read(&self.state, SOURCE, "event_id").event_id
    }

    pub fn environments(&self) -> Vec<String> {
        rw_read(&self.state, SOURCE, "environments")
            .environments
            .keys()
            .cloned()
            .collect()
    }

    /// Copy of the stored state, in the state file layout.
    pub fn export(&self) -> StateFile {
        rw_read(&self.state, SOURCE, "export").clone()
    }

    fn snapshot(&self, scope: &ScopeKey) -> Result<HydrationEvent, SourceError> {
        let state = rw_read(&self.state, SOURCE, "snapshot");
        let features = state
            .environments
            .get(scope.environment())
            .ok_or_else(|| SourceError::UnknownEnvironment {
                environment: scope.environment().to_string(),
            })?
            .iter()
            .filter(|f| scope.includes_project(&f.project))
            .cloned()
            .collect();

        Ok(HydrationEvent::new(
            state.event_id,
            features,
            state.segments.clone(),
        ))
    }
}

#[async_trait]
impl HydrationSource for StateStore {
    async fn hydrate(&self, scope: &ScopeKey) -> Result<HydrationEvent, SourceError> {
        self.snapshot(scope)
    }
}

fn target_environments<'a>(
    environments: &'a mut BTreeMap<String, Vec<ClientFeature>>,
    environment: Option<&str>,
) -> Vec<&'a mut Vec<ClientFeature>> {
    match environment {
        Some(name) => vec![environments.entry(name.to_string()).or_default()],
        None => environments.values_mut().collect(),
    }
}
