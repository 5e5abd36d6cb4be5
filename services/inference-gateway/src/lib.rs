//! Mill extraction inference gateway: model-backed predictions, a water setpoint recommendation,
//! an in-memory run history and spreadsheet export, served over HTTP.

use anyhow::{Context, Result};
use mill_core::{clear_ready, mark_not_live, mark_ready, register_component, ServiceConfig};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod error;
pub mod history;
pub mod model;
pub mod report;
pub mod routes;
pub mod sample_data;
pub mod service;

pub use error::GatewayError;
pub use history::{HistoryStore, PredictionRecord};
pub use model::{load_model, Features, LinearModel, LinearTerm, Regressor};
pub use routes::{build_router, GatewayState};
pub use service::{Clock, InferenceService, Recommendation, RecommendationService, SystemClock};

pub async fn run(cfg: ServiceConfig) -> Result<()> {
    let model = load_model(Path::new(&cfg.model_path)).context("model artifact could not be loaded")?;
    register_component("model", model.describe());
    let state = GatewayState::new(model, Arc::new(SystemClock), cfg.sample_data_path.clone().into(), cfg.report_filename.clone());
    let app = build_router(state, &cfg.cors_origins);

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await.with_context(|| format!("bind {}", cfg.listen_addr))?;
    info!(addr = %cfg.listen_addr, "gateway_listening");
    mark_ready();
    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await {
        error!(error = %e, "server_failed");
        clear_ready();
        mark_not_live();
        return Err(e.into());
    }
    info!("shutdown");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await { warn!(error = ?e, "ctrl_c listener failed"); }
    clear_ready();
    info!("draining");
}
