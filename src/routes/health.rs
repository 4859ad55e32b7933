use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "report-generator",
        "version": env!("CARGO_PKG_VERSION"),
        "demo_mode": !state.config.live_mode(),
    }))
}
