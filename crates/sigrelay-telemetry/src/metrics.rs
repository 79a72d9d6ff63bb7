//! Prometheus metrics for sigrelay.
//!
//! Covers:
//! - Inbound signals by alert type and outcome
//! - Exchange REST calls (count and latency per endpoint)
//! - Orders placed by role
//! - Price cache hit rate
//! - Mass-trade runs
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec,
    TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Inbound webhook signals.
/// Labels: alert_type, outcome (success/failed/invalid/ignored/rejected)
pub static SIGNALS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigrelay_signals_total",
        "Inbound webhook signals by alert type and outcome",
        &["alert_type", "outcome"]
    )
    .unwrap()
});

/// Exchange REST calls.
/// Labels: endpoint, outcome (ok/api_error/http_error/transport_error)
pub static EXCHANGE_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigrelay_exchange_requests_total",
        "Exchange REST calls by endpoint and outcome",
        &["endpoint", "outcome"]
    )
    .unwrap()
});

/// Exchange REST latency in milliseconds.
pub static EXCHANGE_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "sigrelay_exchange_latency_ms",
        "Exchange REST call latency in milliseconds",
        &["endpoint"],
        vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    )
    .unwrap()
});

/// Orders submitted.
/// Labels: kind (entry/stop_loss/take_profit/.../close), outcome (ok/failed)
pub static ORDERS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigrelay_orders_total",
        "Orders submitted by kind and outcome",
        &["kind", "outcome"]
    )
    .unwrap()
});

/// Price cache lookups.
/// Labels: result (hit/miss)
pub static PRICE_CACHE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigrelay_price_cache_total",
        "Price cache lookups by result",
        &["result"]
    )
    .unwrap()
});

/// Mass-trade runs.
/// Labels: kind (execute/close_all), outcome (completed/aborted/disconnected)
pub static MASS_TRADE_RUNS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigrelay_mass_trade_runs_total",
        "Mass-trade runs by kind and outcome",
        &["kind", "outcome"]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    pub fn signal(alert_type: &str, outcome: &str) {
        SIGNALS_TOTAL.with_label_values(&[alert_type, outcome]).inc();
    }

    /// Record one exchange call and its latency.
    pub fn exchange_request(endpoint: &str, outcome: &str, latency_ms: f64) {
        EXCHANGE_REQUESTS_TOTAL
            .with_label_values(&[endpoint, outcome])
            .inc();
        EXCHANGE_LATENCY_MS
            .with_label_values(&[endpoint])
            .observe(latency_ms);
    }

    pub fn order(kind: &str, success: bool) {
        let outcome = if success { "ok" } else { "failed" };
        ORDERS_TOTAL.with_label_values(&[kind, outcome]).inc();
    }

    pub fn price_cache_hit() {
        PRICE_CACHE_TOTAL.with_label_values(&["hit"]).inc();
    }

    pub fn price_cache_miss() {
        PRICE_CACHE_TOTAL.with_label_values(&["miss"]).inc();
    }

    pub fn mass_trade_run(kind: &str, outcome: &str) {
        MASS_TRADE_RUNS_TOTAL
            .with_label_values(&[kind, outcome])
            .inc();
    }
}

/// Render every registered metric in the Prometheus text format.
pub fn gather_text() -> TelemetryResult<String> {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buf = Vec::new();
    encoder
        .encode(&families, &mut buf)
        .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| TelemetryError::Metrics(e.to_string()))
}
