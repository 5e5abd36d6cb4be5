use crate::error::GatewayError;
use crate::history::{HistoryStore, PredictionRecord};
use crate::model::{as_number, Features, Regressor};
use chrono::NaiveDateTime;
use mill_core::GATEWAY_METRICS;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const IMBIBITION_KEY: &str = "imbibition_water_pct_fiber";
const WATER_UPLIFT: f64 = 1.05;

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime { chrono::Local::now().naive_local() }
}

/// Two decimals, ties to even on the exact binary value (fixed-precision formatting is exact).
fn round2(x: f64) -> f64 { format!("{x:.2}").parse().unwrap_or(x) }

fn timed_predict(model: &dyn Regressor, features: &Features, endpoint: &str) -> Result<f64, GatewayError> {
    let start = Instant::now();
    let out = model.predict(features);
    GATEWAY_METRICS.inference_latency_ms.with_label_values(&[endpoint]).observe(start.elapsed().as_secs_f64() * 1000.0);
    out
}

/// Predicts and appends the result to the history log.
#[derive(Clone)]
pub struct InferenceService {
    model: Arc<dyn Regressor>,
    history: Arc<HistoryStore>,
    clock: Arc<dyn Clock>,
}

impl InferenceService {
    pub fn new(model: Arc<dyn Regressor>, history: Arc<HistoryStore>, clock: Arc<dyn Clock>) -> Self { Self { model, history, clock } }

    #[instrument(skip(self, features), fields(feature_count = features.len()))]
    pub fn predict_and_record(&self, features: Features) -> Result<f64, GatewayError> {
        if features.is_empty() { return Err(GatewayError::InvalidRequest("features must be a non-empty object".into())); }
        let predicted = timed_predict(self.model.as_ref(), &features, "predict")?;
        let timestamp = self.clock.now().format(TIMESTAMP_FORMAT).to_string();
        debug!(predicted, %timestamp, "prediction_recorded");
        self.history.append(PredictionRecord { features, predicted_extraction_pct: predicted, timestamp });
        GATEWAY_METRICS.history_records.set(self.history.len() as i64);
        Ok(predicted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Recommendation {
    pub recommended_water_pct_fiber: f64,
    pub predicted_extraction: f64,
}

/// Water setpoint suggestion. Never touches history.
#[derive(Clone)]
pub struct RecommendationService {
    model: Arc<dyn Regressor>,
}

impl RecommendationService {
    pub fn new(model: Arc<dyn Regressor>) -> Self { Self { model } }

    #[instrument(skip(self, features))]
    pub fn recommend(&self, features: &Features) -> Result<Recommendation, GatewayError> {
        let water = features.get(IMBIBITION_KEY)
            .ok_or_else(|| GatewayError::InvalidRequest(format!("missing `{IMBIBITION_KEY}`")))
            .and_then(|v| as_number(v).ok_or_else(|| GatewayError::InvalidRequest(format!("`{IMBIBITION_KEY}` must be numeric"))))?;
        let predicted = timed_predict(self.model.as_ref(), features, "recommend")?;
        Ok(Recommendation { recommended_water_pct_fiber: round2(water * WATER_UPLIFT), predicted_extraction: round2(predicted) })
    }
}
