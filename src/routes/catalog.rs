use axum::Json;
use axum::extract::State;
use serde_json::json;

use crate::AppState;

use super::ApiResponse;

pub async fn list_templates(State(state): State<AppState>) -> Json<ApiResponse> {
    let templates = state.reports.renderer().templates().list();
    Json(ApiResponse::success(
        format!("Found {} templates", templates.len()),
        json!({ "templates": templates }),
    ))
}

pub async fn list_sources(State(state): State<AppState>) -> Json<ApiResponse> {
    let sources = state.reports.registry().describe();
    Json(ApiResponse::success(
        format!("Found {} data sources", sources.len()),
        json!({ "sources": sources }),
    ))
}
