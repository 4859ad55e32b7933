pub mod catalog;
pub mod health;
pub mod reports;

use axum::Router;
use axum::routing::{get, post};
use serde::Serialize;
use serde_json::Value;

use crate::AppState;

/// Envelope shared by every `/api` response.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
    pub data: Option<Value>,
}

impl ApiResponse {
    pub fn success(message: impl Into<String>, data: Value) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            data: Some(data),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/reports", get(reports::list_reports))
        .route("/api/reports/generate", post(reports::generate_report))
        .route("/api/reports/{id}", get(reports::get_report))
        .route("/api/reports/{id}/download", get(reports::download_report))
        .route("/api/templates", get(catalog::list_templates))
        .route("/api/sources", get(catalog::list_sources))
        .with_state(state)
}
