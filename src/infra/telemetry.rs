use std::sync::Once;

use metrics::{Unit, describe_counter};
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "pagegate_cache_hit_total",
            Unit::Count,
            "Total number of requests served from a fresh cache file."
        );
        describe_counter!(
            "pagegate_cache_miss_total",
            Unit::Count,
            "Total number of requests rendered because the cache file was absent, stale, vetoed or unreadable."
        );
        describe_counter!(
            "pagegate_cache_not_modified_total",
            Unit::Count,
            "Total number of conditional requests answered with 304 Not Modified."
        );
        describe_counter!(
            "pagegate_cache_write_error_total",
            Unit::Count,
            "Total number of rendered pages that could not be persisted."
        );
    });
}
