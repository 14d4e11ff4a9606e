//! Prometheus Metrics Module
//!
//! Exposes relay and viewer metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Pairs**: Active relay pairs, accepts and teardowns by reason
//! - **Frames**: Frames forwarded and dropped per direction
//! - **Upstream**: Failed upstream opens
//! - **Viewer**: Reconnects, protocol errors, ingested samples and ingest latency
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
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
    // Relay pairs
    describe_gauge!(
        "scoreboard_relay_active_pairs",
        "Number of relay pairs currently forwarding"
    );
    describe_counter!(
        "scoreboard_relay_pairs_accepted_total",
        "Total downstream connections accepted by the relay"
    );
    describe_counter!(
        "scoreboard_relay_teardowns_total",
        "Total relay pair teardowns by reason"
    );

    // Frames
    describe_counter!(
        "scoreboard_relay_frames_forwarded_total",
        "Total frames forwarded between legs"
    );
    describe_counter!(
        "scoreboard_relay_frames_dropped_total",
        "Total frames dropped because the peer leg was not open"
    );

    // Upstream
    describe_counter!(
        "scoreboard_relay_upstream_failures_total",
        "Total failed upstream opens"
    );

    // Viewer
    describe_counter!(
        "scoreboard_client_reconnects_total",
        "Total automatic and manual reconnect attempts"
    );
    describe_counter!(
        "scoreboard_client_events_dropped_total",
        "Total client events dropped because the consumer fell behind"
    );
    describe_counter!(
        "scoreboard_client_protocol_errors_total",
        "Total discarded inbound messages"
    );
    describe_counter!(
        "scoreboard_samples_ingested_total",
        "Total samples appended to instrument series"
    );
    describe_counter!(
        "scoreboard_samples_evicted_total",
        "Total samples evicted from full series"
    );
    describe_histogram!(
        "scoreboard_ingest_seconds",
        "Time to ingest a snapshot and render the update"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Direction a frame travels through the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Viewer to source.
    Upstream,
    /// Source to viewer.
    Downstream,
}

impl Direction {
    /// Metric label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upstream => "upstream",
            Self::Downstream => "downstream",
        }
    }
}

/// Record a newly accepted downstream connection.
pub fn record_pair_accepted() {
    counter!("scoreboard_relay_pairs_accepted_total").increment(1);
}

/// Update the active pair count.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_pairs(count: usize) {
    gauge!("scoreboard_relay_active_pairs").set(count as f64);
}

/// Record a pair teardown.
pub fn record_teardown(reason: &'static str) {
    counter!("scoreboard_relay_teardowns_total", "reason" => reason).increment(1);
}

/// Record a forwarded frame.
pub fn record_frame_forwarded(direction: Direction) {
    counter!(
        "scoreboard_relay_frames_forwarded_total",
        "direction" => direction.as_str()
    )
    .increment(1);
}

/// Record a dropped frame.
pub fn record_frame_dropped(direction: Direction) {
    counter!(
        "scoreboard_relay_frames_dropped_total",
        "direction" => direction.as_str()
    )
    .increment(1);
}

/// Record a failed upstream open.
pub fn record_upstream_failure() {
    counter!("scoreboard_relay_upstream_failures_total").increment(1);
}

/// Record a reconnect attempt.
pub fn record_reconnect(manual: bool) {
    counter!(
        "scoreboard_client_reconnects_total",
        "trigger" => if manual { "manual" } else { "automatic" }
    )
    .increment(1);
}

/// Record a client event dropped on a full event channel.
pub fn record_event_dropped() {
    counter!("scoreboard_client_events_dropped_total").increment(1);
}

/// Record a discarded inbound message.
pub fn record_protocol_error() {
    counter!("scoreboard_client_protocol_errors_total").increment(1);
}

/// Record samples appended and evicted by one ingest.
pub fn record_samples(appended: usize, evicted: usize) {
    counter!("scoreboard_samples_ingested_total").increment(appended as u64);
    if evicted > 0 {
        counter!("scoreboard_samples_evicted_total").increment(evicted as u64);
    }
}

/// Record ingest-and-render duration.
pub fn record_ingest_duration(duration: Duration) {
    histogram!("scoreboard_ingest_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
