//! Gateway metrics registered in the default Prometheus registry and served by `/metrics`.

use once_cell::sync::Lazy;
use prometheus::{register_histogram_vec, register_int_counter_vec, register_int_gauge, HistogramVec, IntCounterVec, IntGauge};

pub struct GatewayMetrics {
    pub requests_total: IntCounterVec,
    pub inference_latency_ms: HistogramVec,
    pub history_records: IntGauge,
}

pub static GATEWAY_METRICS: Lazy<GatewayMetrics> = Lazy::new(|| {
    GatewayMetrics {
        requests_total: register_int_counter_vec!(
            "mill_gateway_requests_total",
            "Requests handled by endpoint and outcome",
            &["endpoint", "outcome"]
        ).expect("mill_gateway_requests_total definition"),
        inference_latency_ms: register_histogram_vec!(
            "mill_gateway_inference_latency_ms",
            "Model inference latency (ms)",
            &["endpoint"],
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0]
        ).expect("mill_gateway_inference_latency_ms definition"),
        history_records: register_int_gauge!(
            "mill_gateway_history_records",
            "Records currently held in the history store"
        ).expect("mill_gateway_history_records definition"),
    }
});

pub fn record_request(endpoint: &str, outcome: &str) {
    GATEWAY_METRICS.requests_total.with_label_values(&[endpoint, outcome]).inc();
}
