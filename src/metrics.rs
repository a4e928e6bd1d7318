//! Prometheus metrics definitions.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

/// Entries collected in the current session.
pub static ENTRIES_COLLECTED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "regfind_entries_collected",
        "Number of entries collected so far"
    )
    .unwrap()
});

/// Roots that could not be opened.
pub static ROOTS_UNAVAILABLE: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "regfind_roots_unavailable_total",
        "Total number of roots that could not be opened"
    )
    .unwrap()
});

/// Values skipped during enumeration.
pub static VALUES_SKIPPED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "regfind_values_skipped_total",
        "Total number of values that could not be read"
    )
    .unwrap()
});

/// Subtrees abandoned during enumeration.
pub static SUBTREES_ABANDONED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "regfind_subtrees_abandoned_total",
        "Total number of subtrees abandoned after a read failure"
    )
    .unwrap()
});

/// Recomputes run, by trigger.
pub static RECOMPUTES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "regfind_recomputes_total",
        "Total number of filtered view recomputes",
        &["trigger"]
    )
    .unwrap()
});

/// Recomputes skipped, by reason.
pub static RECOMPUTES_SKIPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "regfind_recomputes_skipped_total",
        "Total number of periodic recomputes skipped",
        &["reason"]
    )
    .unwrap()
});

/// Recompute latency histogram.
pub static RECOMPUTE_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "regfind_recompute_duration_seconds",
        "Filtered view recompute latency in seconds",
        &["trigger"],
        vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap()
});

/// Initialize all metrics (call once at startup).
pub fn init_metrics() {
    // Access lazy statics to register them
    let _ = &*ENTRIES_COLLECTED;
    let _ = &*ROOTS_UNAVAILABLE;
    let _ = &*VALUES_SKIPPED;
    let _ = &*SUBTREES_ABANDONED;
    let _ = &*RECOMPUTES;
    let _ = &*RECOMPUTES_SKIPPED;
    let _ = &*RECOMPUTE_LATENCY;

    tracing::debug!("Prometheus metrics initialized");
}

/// Render every registered metric in the text exposition format.
#[must_use]
pub fn render_metrics() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
