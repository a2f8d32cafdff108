use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
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
            "mindprint_export_total",
            Unit::Count,
            "Total number of successful PDF exports, labelled by document kind."
        );
        describe_counter!(
            "mindprint_export_rejected_total",
            Unit::Count,
            "Total number of rejected or failed export requests, labelled by reason."
        );
        describe_counter!(
            "mindprint_gate_rejected_total",
            Unit::Count,
            "Total number of render-view requests rejected by the ticket gate."
        );
        describe_histogram!(
            "mindprint_render_ms",
            Unit::Milliseconds,
            "End-to-end render latency for successful exports in milliseconds."
        );
        describe_histogram!(
            "mindprint_engine_capture_ms",
            Unit::Milliseconds,
            "Chromium page load and PDF capture latency in milliseconds."
        );
    });
}
