//! Prometheus Metrics Module
//!
//! Exposes stream delivery metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Delivery**: Events and keep-alives written, by stream kind
//! - **Connections**: Live streaming connections
//! - **Usage**: Metering failures
//! - **Latency**: Time spent matching one tick's candidates
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::streaming::StreamKind;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Later calls return the handle installed by the first.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Delivery counters
    describe_counter!(
        "filtered_stream_events_delivered_total",
        "Total events written to streaming connections"
    );
    describe_counter!(
        "filtered_stream_keep_alives_total",
        "Total keep-alive lines written to streaming connections"
    );

    // Connection gauges
    describe_gauge!(
        "filtered_stream_active_connections",
        "Number of live streaming connections"
    );

    // Error counters
    describe_counter!(
        "filtered_stream_usage_failures_total",
        "Total usage reports the meter rejected"
    );

    // Latency histograms
    describe_histogram!(
        "filtered_stream_tick_matching_seconds",
        "Time to evaluate one tick's candidates against the rule set"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record an event written to a connection.
pub fn record_event_delivered(kind: &StreamKind) {
    counter!(
        "filtered_stream_events_delivered_total",
        "stream" => kind.name()
    )
    .increment(1);
}

/// Record a keep-alive written to a connection.
pub fn record_keep_alive(kind: &StreamKind) {
    counter!(
        "filtered_stream_keep_alives_total",
        "stream" => kind.name()
    )
    .increment(1);
}

/// Update the live connection count.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_connections(count: usize) {
    gauge!("filtered_stream_active_connections").set(count as f64);
}

/// Record a usage report the meter rejected.
pub fn record_usage_failure() {
    counter!("filtered_stream_usage_failures_total").increment(1);
}

/// Record how long one search tick spent matching.
pub fn record_tick_matching(duration: Duration) {
    histogram!("filtered_stream_tick_matching_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_noop() {
        record_event_delivered(&StreamKind::Search);
        record_keep_alive(&StreamKind::Language("en".to_string()));
        set_active_connections(3);
        record_usage_failure();
        record_tick_matching(Duration::from_millis(2));
    }
}
