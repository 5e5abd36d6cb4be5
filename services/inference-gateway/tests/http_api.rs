//! Drives the gateway router in-process, one request at a time.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{NaiveDate, NaiveDateTime};
use inference_gateway::{build_router, Clock, GatewayState, LinearModel, LinearTerm, Regressor};
use serde_json::{json, Value};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

struct FixedClock(NaiveDateTime);
impl Clock for FixedClock { fn now(&self) -> NaiveDateTime { self.0 } }

fn model() -> Arc<dyn Regressor> {
    Arc::new(LinearModel::new(70.0, vec![
        LinearTerm::Numeric { name: "imbibition_water_pct_fiber".into(), weight: 1.0 },
        LinearTerm::Numeric { name: "crusher_speed_rpm".into(), weight: 0.005 },
    ]))
}

fn gateway(sample_data: PathBuf) -> Router {
    gateway_with_origins(sample_data, &["http://localhost:3000"])
}

fn gateway_with_origins(sample_data: PathBuf, origins: &[&str]) -> Router {
    let clock = Arc::new(FixedClock(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()));
    let state = GatewayState::new(model(), clock, sample_data, "mill_report.xlsx".into());
    let origins: Vec<String> = origins.iter().map(|o| o.to_string()).collect();
    build_router(state, &origins)
}

async fn call_from(app: &Router, method: Method, uri: &str, origin: &str, extra: &[(&str, &str)]) -> axum::http::HeaderMap {
    let mut req = Request::builder().method(method).uri(uri).header(header::ORIGIN, origin);
    for (k, v) in extra { req = req.header(*k, *v); }
    let resp = app.clone().oneshot(req.body(Body::empty()).unwrap()).await.unwrap();
    resp.headers().clone()
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => { req = req.header(header::CONTENT_TYPE, "application/json"); Body::from(v.to_string()) }
        None => Body::empty(),
    };
    let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, headers, bytes.to_vec())
}

fn json_of(bytes: &[u8]) -> Value { serde_json::from_slice(bytes).unwrap() }

#[tokio::test]
async fn predict_returns_value_and_records_history() {
    let app = gateway(PathBuf::from("unused.csv"));
    let input = json!({"imbibition_water_pct_fiber": 10.0, "crusher_speed_rpm": 400, "mill_line": "A"});
    let (status, _, body) = call(&app, Method::POST, "/predict", Some(input)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&body), json!({"predicted_extraction_pct": 82.0}));

    let (_, _, body) = call(&app, Method::GET, "/history", None).await;
    assert_eq!(json_of(&body), json!({"history": [{
        "imbibition_water_pct_fiber": 10.0,
        "crusher_speed_rpm": 400,
        "mill_line": "A",
        "predicted_extraction_pct": 82.0,
        "timestamp": "2024-01-01 00:00:00",
    }]}));
}

#[tokio::test]
async fn predict_errors_are_structured_and_leave_history_alone() {
    let app = gateway(PathBuf::from("unused.csv"));
    let (status, _, body) = call(&app, Method::POST, "/predict", Some(json!({"mill_line": "A"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json_of(&body)["error"].as_str().unwrap().contains("imbibition_water_pct_fiber"));

    let (status, _, body) = call(&app, Method::POST, "/predict", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json_of(&body).get("error").is_some());

    let (status, _, body) = call(&app, Method::POST, "/predict", Some(json!([1, 2]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json_of(&body).get("error").is_some());

    let (_, _, body) = call(&app, Method::GET, "/history", None).await;
    assert_eq!(json_of(&body), json!({"history": []}));
}

#[tokio::test]
async fn malformed_json_is_an_invalid_request() {
    let app = gateway(PathBuf::from("unused.csv"));
    let req = Request::post("/predict").header(header::CONTENT_TYPE, "application/json").body(Body::from("{not json")).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert!(json_of(&bytes).get("error").is_some());
}

#[tokio::test]
async fn recommend_does_not_touch_history() {
    let app = gateway(PathBuf::from("unused.csv"));
    let input = json!({"imbibition_water_pct_fiber": 10.0, "crusher_speed_rpm": 400});
    let (status, _, body) = call(&app, Method::POST, "/recommend", Some(input)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&body), json!({"recommendation": {"recommended_water_pct_fiber": 10.5, "predicted_extraction": 82.0}}));

    let (status, _, _) = call(&app, Method::POST, "/recommend", Some(json!({"crusher_speed_rpm": 400}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, _, body) = call(&app, Method::GET, "/history", None).await;
    assert_eq!(json_of(&body)["history"], json!([]));
}

#[tokio::test]
async fn delete_by_timestamp_removes_all_collisions() {
    let app = gateway(PathBuf::from("unused.csv"));
    for w in [10.0, 12.0] {
        call(&app, Method::POST, "/predict", Some(json!({"imbibition_water_pct_fiber": w, "crusher_speed_rpm": 0}))).await;
    }
    let (_, _, body) = call(&app, Method::DELETE, "/delete_record/2024-01-01%2000:00:01", None).await;
    assert_eq!(json_of(&body), json!({"deleted_count": 0}));

    let (status, _, body) = call(&app, Method::DELETE, "/delete_record/2024-01-01%2000:00:00", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&body), json!({"deleted_count": 2}));

    let (_, _, body) = call(&app, Method::GET, "/history", None).await;
    assert_eq!(json_of(&body)["history"], json!([]));
}

#[tokio::test]
async fn delete_all_is_idempotent() {
    let app = gateway(PathBuf::from("unused.csv"));
    call(&app, Method::POST, "/predict", Some(json!({"imbibition_water_pct_fiber": 9.0, "crusher_speed_rpm": 0}))).await;
    for _ in 0..2 {
        let (status, _, body) = call(&app, Method::DELETE, "/delete_all", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body), json!({"message": "All records deleted"}));
        let (_, _, body) = call(&app, Method::GET, "/history", None).await;
        assert_eq!(json_of(&body)["history"], json!([]));
    }
}

#[tokio::test]
async fn download_report_with_empty_history_returns_error_object() {
    let app = gateway(PathBuf::from("unused.csv"));
    for body in [json!({"history": []}), json!({})] {
        let (status, headers, bytes) = call(&app, Method::POST, "/download_report", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers.get(header::CONTENT_DISPOSITION).is_none());
        assert_eq!(json_of(&bytes), json!({"error": "No history data to export"}));
    }
}

#[tokio::test]
async fn download_report_returns_spreadsheet_attachment() {
    let app = gateway(PathBuf::from("unused.csv"));
    let history = json!({"history": [
        {"imbibition_water_pct_fiber": 10.0, "predicted_extraction_pct": 82.5, "timestamp": "2024-01-01 00:00:00"},
    ]});
    let (status, headers, bytes) = call(&app, Method::POST, "/download_report", Some(history)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet");
    assert_eq!(headers[header::CONTENT_DISPOSITION], "attachment; filename=\"mill_report.xlsx\"");
    assert_eq!(&bytes[..2], b"PK");
}

#[tokio::test]
async fn download_report_rejects_non_array_history() {
    let app = gateway(PathBuf::from("unused.csv"));
    let (status, _, bytes) = call(&app, Method::POST, "/download_report", Some(json!({"history": "all"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json_of(&bytes).get("error").is_some());
}

#[tokio::test]
async fn sample_data_serves_csv_rows() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    write!(f, "imbibition_water_pct_fiber,mill_line\n10.5,A\n9,B\n").unwrap();
    let app = gateway(f.path().to_path_buf());
    let (status, _, body) = call(&app, Method::GET, "/sample-data", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&body), json!([
        {"imbibition_water_pct_fiber": 10.5, "mill_line": "A"},
        {"imbibition_water_pct_fiber": 9, "mill_line": "B"},
    ]));
}

#[tokio::test]
async fn sample_data_missing_file_is_error_object() {
    let app = gateway(PathBuf::from("/nonexistent/factory_realtime_data.csv"));
    let (status, _, body) = call(&app, Method::GET, "/sample-data", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json_of(&body).get("error").is_some());
}

#[tokio::test]
async fn health_routes_are_merged() {
    let app = gateway(PathBuf::from("unused.csv"));
    let (status, _, body) = call(&app, Method::GET, "/live", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&body), json!({"live": true}));
}

#[tokio::test]
async fn wildcard_origin_allows_any_caller() {
    let app = gateway_with_origins(PathBuf::from("unused.csv"), &["http://localhost:3000", "*"]);
    let headers = call_from(&app, Method::GET, "/history", "http://plant.example", &[]).await;
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn listed_origin_is_echoed_and_others_get_no_grant() {
    let app = gateway(PathBuf::from("unused.csv"));
    let headers = call_from(&app, Method::GET, "/history", "http://localhost:3000", &[]).await;
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:3000");

    let headers = call_from(&app, Method::GET, "/history", "http://plant.example", &[]).await;
    assert!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

#[tokio::test]
async fn preflight_for_listed_origin_allows_post() {
    let app = gateway(PathBuf::from("unused.csv"));
    let headers = call_from(&app, Method::OPTIONS, "/predict", "http://localhost:3000", &[
        ("access-control-request-method", "POST"),
        ("access-control-request-headers", "content-type"),
    ]).await;
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:3000");
    assert!(headers.get(header::ACCESS_CONTROL_ALLOW_METHODS).is_some());
}

#[tokio::test]
async fn concurrent_predictions_all_recorded() {
    let app = gateway(PathBuf::from("unused.csv"));
    let tasks: Vec<_> = (0..32).map(|i| {
        let app = app.clone();
        tokio::spawn(async move {
            call(&app, Method::POST, "/predict", Some(json!({"imbibition_water_pct_fiber": i, "crusher_speed_rpm": 0}))).await
        })
    }).collect();
    for t in tasks { assert_eq!(t.await.unwrap().0, StatusCode::OK); }
    let (_, _, body) = call(&app, Method::GET, "/history", None).await;
    assert_eq!(json_of(&body)["history"].as_array().unwrap().len(), 32);
}
