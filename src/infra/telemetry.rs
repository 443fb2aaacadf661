use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register descriptions for every metric the service emits.
///
/// Safe to call repeatedly; only the first call registers.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "flagsync_delta_events_total",
            Unit::Count,
            "Total number of delta events appended to caches."
        );
        describe_counter!(
            "flagsync_delta_evicted_total",
            Unit::Count,
            "Total number of delta events evicted from cache buffers."
        );
        describe_histogram!(
            "flagsync_delta_fold_ms",
            Unit::Milliseconds,
            "Latency of folding one batch into a delta cache."
        );
        describe_gauge!(
            "flagsync_delta_memory_bytes",
            Unit::Bytes,
            "Serialized size of every live delta cache."
        );
        describe_gauge!(
            "flagsync_registry_caches",
            Unit::Count,
            "Number of live per-scope delta caches."
        );
        describe_counter!(
            "flagsync_sync_responses_total",
            Unit::Count,
            "Client sync responses by outcome."
        );
    });
}
