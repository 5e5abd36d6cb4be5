use anyhow::Result;
use mill_core::{init_tracing, load_config};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = load_config("inference-gateway")?;
    init_tracing(&cfg.service_name, &cfg.log_level)?;
    info!(?cfg, "config_loaded");
    inference_gateway::run(cfg).await
}
