use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::tasks::METRIC_TASK_TIMEOUT_TOTAL;
use crate::cache::{METRIC_CACHE_ERROR_TOTAL, METRIC_CACHE_HIT_TOTAL, METRIC_CACHE_MISS_TOTAL};
use crate::config::{LogFormat, LoggingSettings};
use crate::counters::{
    METRIC_COUNTER_BUFFERED_TOTAL, METRIC_COUNTER_DROPPED_TOTAL, METRIC_COUNTER_FALLBACK_TOTAL,
    METRIC_RECONCILE_APPLIED_TOTAL, METRIC_RECONCILE_FAILED_TOTAL, METRIC_RECONCILE_FLUSH_MS,
};
use crate::search::{METRIC_SEARCH_BACKEND_TOTAL, METRIC_SEARCH_ENGINE_ERROR_TOTAL};

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

/// Register descriptions for every metric the crate emits. Safe to call repeatedly.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT_TOTAL,
            Unit::Count,
            "Accelerator cache hits, labelled by entry kind."
        );
        describe_counter!(
            METRIC_CACHE_MISS_TOTAL,
            Unit::Count,
            "Accelerator cache misses, labelled by entry kind."
        );
        describe_counter!(
            METRIC_CACHE_ERROR_TOTAL,
            Unit::Count,
            "Accelerator calls that failed or timed out during cache operations."
        );
        describe_counter!(
            METRIC_COUNTER_BUFFERED_TOTAL,
            Unit::Count,
            "Counter increments buffered in the accelerator."
        );
        describe_counter!(
            METRIC_COUNTER_FALLBACK_TOTAL,
            Unit::Count,
            "Counter increments written straight to the store."
        );
        describe_counter!(
            METRIC_COUNTER_DROPPED_TOTAL,
            Unit::Count,
            "View and like increments lost because both the accelerator and the store failed, labelled by kind."
        );
        describe_counter!(
            METRIC_RECONCILE_APPLIED_TOTAL,
            Unit::Count,
            "Buffered counter keys folded into the store."
        );
        describe_counter!(
            METRIC_RECONCILE_FAILED_TOTAL,
            Unit::Count,
            "Buffered counter keys left for a later cycle after a store failure."
        );
        describe_histogram!(
            METRIC_RECONCILE_FLUSH_MS,
            Unit::Milliseconds,
            "Duration of one reconciliation cycle in milliseconds."
        );
        describe_counter!(
            METRIC_SEARCH_BACKEND_TOTAL,
            Unit::Count,
            "Searches served, labelled by the backend that answered."
        );
        describe_counter!(
            METRIC_SEARCH_ENGINE_ERROR_TOTAL,
            Unit::Count,
            "Search engine failures, labelled by operation."
        );
        describe_counter!(
            METRIC_TASK_TIMEOUT_TOTAL,
            Unit::Count,
            "Background tasks cancelled at their deadline."
        );
    });
}
