use crate::error::GatewayError;
use crate::history::HistoryStore;
use crate::model::{Features, Regressor};
use crate::report::{export_xlsx, XLSX_CONTENT_TYPE};
use crate::sample_data::read_records;
use crate::service::{Clock, InferenceService, RecommendationService};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use mill_core::{record_request, GATEWAY_METRICS};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

type Payload = Result<Json<Value>, JsonRejection>;

#[derive(Clone)]
pub struct GatewayState {
    pub inference: InferenceService,
    pub recommendation: RecommendationService,
    pub history: Arc<HistoryStore>,
    pub sample_data_path: PathBuf,
    pub report_filename: String,
}

impl GatewayState {
    pub fn new(model: Arc<dyn Regressor>, clock: Arc<dyn Clock>, sample_data_path: PathBuf, report_filename: String) -> Self {
        let history = Arc::new(HistoryStore::new());
        Self {
            inference: InferenceService::new(model.clone(), history.clone(), clock),
            recommendation: RecommendationService::new(model),
            history,
            sample_data_path,
            report_filename,
        }
    }
}

pub fn build_router(state: GatewayState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/recommend", post(recommend))
        .route("/history", get(history))
        .route("/delete_record/:timestamp", delete(delete_record))
        .route("/delete_all", delete(delete_all))
        .route("/download_report", post(download_report))
        .route("/sample-data", get(sample_data))
        .with_state(state)
        .merge(mill_core::health_router())
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

/// `*` anywhere in the list opens CORS to every origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") { return base.allow_origin(Any); }
    let list: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    base.allow_origin(AllowOrigin::list(list))
}

fn tally<T>(endpoint: &str, res: Result<T, GatewayError>) -> Result<T, GatewayError> {
    record_request(endpoint, match &res { Ok(_) => "ok", Err(e) => e.kind() });
    res
}

fn object_body(payload: Payload) -> Result<Features, GatewayError> {
    let Json(body) = payload.map_err(|e| GatewayError::InvalidRequest(e.body_text()))?;
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(GatewayError::InvalidRequest("body must be a JSON object".into())),
    }
}

fn sync_history_gauge(store: &HistoryStore) { GATEWAY_METRICS.history_records.set(store.len() as i64); }

#[instrument(skip_all)]
async fn predict(State(st): State<GatewayState>, payload: Payload) -> Result<Json<Value>, GatewayError> {
    let res = object_body(payload).and_then(|f| st.inference.predict_and_record(f));
    let predicted = tally("predict", res)?;
    Ok(Json(json!({ "predicted_extraction_pct": predicted })))
}

#[instrument(skip_all)]
async fn recommend(State(st): State<GatewayState>, payload: Payload) -> Result<Json<Value>, GatewayError> {
    let res = object_body(payload).and_then(|f| st.recommendation.recommend(&f));
    let recommendation = tally("recommend", res)?;
    Ok(Json(json!({ "recommendation": recommendation })))
}

async fn history(State(st): State<GatewayState>) -> Json<Value> {
    record_request("history", "ok");
    Json(json!({ "history": st.history.list() }))
}

#[instrument(skip(st))]
async fn delete_record(State(st): State<GatewayState>, Path(timestamp): Path<String>) -> Json<Value> {
    let deleted = st.history.delete(&timestamp);
    sync_history_gauge(&st.history);
    record_request("delete_record", "ok");
    info!(deleted, "history_record_deleted");
    Json(json!({ "deleted_count": deleted }))
}

async fn delete_all(State(st): State<GatewayState>) -> Json<Value> {
    let dropped = st.history.clear();
    sync_history_gauge(&st.history);
    record_request("delete_all", "ok");
    info!(records = dropped, "history_cleared");
    Json(json!({ "message": "All records deleted" }))
}

#[instrument(skip_all)]
async fn download_report(State(st): State<GatewayState>, payload: Payload) -> Result<Response, GatewayError> {
    let res = object_body(payload).and_then(|body| report_rows(&body)).and_then(|rows| export_xlsx(&rows));
    let bytes = tally("download_report", res)?;
    let disposition = format!("attachment; filename=\"{}\"", st.report_filename);
    Ok(([(header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()), (header::CONTENT_DISPOSITION, disposition)], bytes).into_response())
}

fn report_rows(body: &Features) -> Result<Vec<Features>, GatewayError> {
    match body.get("history") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items.iter()
            .map(|i| i.as_object().cloned().ok_or_else(|| GatewayError::InvalidRequest("history entries must be objects".into())))
            .collect(),
        Some(_) => Err(GatewayError::InvalidRequest("`history` must be an array".into())),
    }
}

async fn sample_data(State(st): State<GatewayState>) -> Result<Json<Value>, GatewayError> {
    let rows = tally("sample_data", read_records(&st.sample_data_path))?;
    Ok(Json(Value::Array(rows.into_iter().map(Value::Object).collect())))
}
