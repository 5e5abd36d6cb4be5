//! Core shared utilities for mill services: tracing, layered config, health probes and metrics.

use anyhow::Result;
use axum::{http::{header, StatusCode}, response::{IntoResponse, Response}, routing::get, Router};
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::RwLock;
use prometheus::{Encoder, TextEncoder};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod config;
pub mod metrics;

pub use config::{current_config, load_config, load_config_from, ServiceConfig};
pub use metrics::{GatewayMetrics, GATEWAY_METRICS, record_request};

static TRACING_INIT: OnceCell<()> = OnceCell::new();
static NODE_LIVENESS: AtomicBool = AtomicBool::new(true);
static NODE_READINESS: AtomicBool = AtomicBool::new(false);
static COMPONENTS: Lazy<RwLock<BTreeMap<String, String>>> = Lazy::new(|| RwLock::new(BTreeMap::new()));

pub fn mark_ready() { NODE_READINESS.store(true, Ordering::SeqCst); }
pub fn clear_ready() { NODE_READINESS.store(false, Ordering::SeqCst); }
pub fn mark_not_live() { NODE_LIVENESS.store(false, Ordering::SeqCst); }
pub fn is_ready() -> bool { NODE_READINESS.load(Ordering::SeqCst) }
pub fn is_live() -> bool { NODE_LIVENESS.load(Ordering::SeqCst) }

/// Attach a named detail (e.g. the loaded model) to the `/status` payload.
pub fn register_component(name: &str, detail: impl Into<String>) {
    COMPONENTS.write().insert(name.to_string(), detail.into());
}

/// Install the global subscriber. `RUST_LOG` wins over `default_level`; `MILL_JSON_LOG=1` switches to JSON lines.
pub fn init_tracing(service: &str, default_level: &str) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let json = std::env::var("MILL_JSON_LOG").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        let json_layer = json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
        });
        let text_layer = (!json).then(|| {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_line_number(true)
        });
        tracing_subscriber::registry().with(env_filter).with(json_layer).with(text_layer).try_init()?;
        Ok(())
    })?;
    info!(target: "mill_core", service, "tracing_initialized");
    Ok(())
}

/// Probe and metrics routes, meant to be merged into a service router.
pub fn health_router() -> Router {
    Router::new()
        .route("/live", get(live_handler))
        .route("/ready", get(ready_handler))
        .route("/status", get(|| async {
            axum::Json(serde_json::json!({
                "service_name": current_config().map(|c| c.service_name),
                "live": is_live(),
                "ready": is_ready(),
                "components": COMPONENTS.read().clone(),
            }))
        }))
        .route("/metrics", get(metrics_handler))
}

async fn live_handler() -> Response {
    let live = is_live();
    let status = if live { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, axum::Json(serde_json::json!({"live": live}))).into_response()
}

async fn ready_handler() -> Response {
    let ready = is_ready();
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, axum::Json(serde_json::json!({"ready": ready}))).into_response()
}

async fn metrics_handler() -> Response {
    let metric_families = prometheus::gather();
    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&metric_families, &mut buf) {
        return (StatusCode::INTERNAL_SERVER_ERROR, format!("encode error: {e}")).into_response();
    }
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], buf).into_response()
}
