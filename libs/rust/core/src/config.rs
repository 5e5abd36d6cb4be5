//! Layered service configuration: defaults, optional file (`MILL_CONFIG_FILE`), then `MILL__*` env vars.

use anyhow::Result;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::Deserialize;
use std::path::Path;

static CONFIG_CACHE: OnceCell<RwLock<ServiceConfig>> = OnceCell::new();

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub service_name: String,
    pub listen_addr: String,
    pub model_path: String,
    pub sample_data_path: String,
    pub report_filename: String,
    pub cors_origins: Vec<String>,
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_name: "inference-gateway".into(),
            listen_addr: "0.0.0.0:8000".into(),
            model_path: "models/thirdmodel.json".into(),
            sample_data_path: "data/factory_realtime_data.csv".into(),
            report_filename: "mill_report.xlsx".into(),
            cors_origins: vec!["http://localhost:3000".into(), "*".into()],
            log_level: "info".into(),
        }
    }
}

pub fn load_config(service: &str) -> Result<ServiceConfig> {
    let mut builder = config::Config::builder().set_default("service_name", service)?;
    if let Ok(file) = std::env::var("MILL_CONFIG_FILE") {
        builder = builder.add_source(config::File::with_name(&file).required(false));
    }
    builder = builder.add_source(
        config::Environment::with_prefix("MILL")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("cors_origins")
            .try_parsing(true),
    );
    let cfg: ServiceConfig = builder.build()?.try_deserialize()?;
    cache(&cfg);
    Ok(cfg)
}

/// Defaults plus exactly one required file, no environment overlay.
pub fn load_config_from(path: &Path) -> Result<ServiceConfig> {
    let cfg: ServiceConfig = config::Config::builder()
        .add_source(config::File::from(path).required(true))
        .build()?
        .try_deserialize()?;
    cache(&cfg);
    Ok(cfg)
}

pub fn current_config() -> Option<ServiceConfig> { CONFIG_CACHE.get().map(|c| c.read().clone()) }

fn cache(cfg: &ServiceConfig) {
    let lock = CONFIG_CACHE.get_or_init(|| RwLock::new(cfg.clone()));
    *lock.write() = cfg.clone();
}
