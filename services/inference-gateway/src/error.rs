use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("model load failed: {0}")]
    ModelLoad(String),
    #[error("invalid model input: {0}")]
    ModelInput(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("No history data to export")]
    EmptyReport,
    #[error("report export failed: {0}")]
    Report(#[from] rust_xlsxwriter::XlsxError),
    #[error("sample data unavailable: {0}")]
    SampleData(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::ModelInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            // empty export degrades to an error object on a normal response
            GatewayError::EmptyReport => StatusCode::OK,
            GatewayError::ModelLoad(_) | GatewayError::Report(_) | GatewayError::SampleData(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::ModelLoad(_) => "model_load",
            GatewayError::ModelInput(_) => "model_input",
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::EmptyReport => "empty_report",
            GatewayError::Report(_) => "report",
            GatewayError::SampleData(_) => "sample_data",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        tracing::warn!(kind = self.kind(), error = %self, "request_failed");
        (self.status(), Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
