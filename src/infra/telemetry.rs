//! Process-wide tracing and metric descriptions.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing::Subscriber;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, Layer, fmt, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};
use crate::purge::dispatcher::{METRIC_DISPATCH_MS, METRIC_FULL_PURGES, METRIC_PURGE_REQUESTS};

use super::error::InfraError;

static DESCRIBE_ONCE: Once = Once::new();

/// Installs the global subscriber. `RUST_LOG` directives refine the
/// configured level.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    DESCRIBE_ONCE.call_once(describe_purge_metrics);

    let filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(ErrorLayer::default())
        .with(output_layer(logging.format))
        .try_init()
        .map_err(|err| InfraError::Telemetry(err.to_string()))
}

fn output_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
    }
}

fn describe_purge_metrics() {
    describe_counter!(
        METRIC_PURGE_REQUESTS,
        Unit::Count,
        "PURGE requests sent to cache hosts, by outcome."
    );
    describe_counter!(
        METRIC_FULL_PURGES,
        Unit::Count,
        "Wildcard purges fanned out to every cache host."
    );
    describe_histogram!(
        METRIC_DISPATCH_MS,
        Unit::Milliseconds,
        "Wall time to dispatch one batch of purge targets."
    );
}
