use axum::{
    Json,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::pipeline::DEFAULT_TEMPLATE;

use super::ApiResponse;

#[derive(Debug, Deserialize)]
pub struct GenerateReportBody {
    pub title: String,
    #[serde(default = "default_template")]
    pub template: String,
    pub data_sources: Option<Vec<String>>,
}

fn default_template() -> String {
    DEFAULT_TEMPLATE.to_string()
}

pub async fn generate_report(
    State(state): State<AppState>,
    Json(body): Json<GenerateReportBody>,
) -> AppResult<Json<ApiResponse>> {
    let title = body.title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("title must not be empty".into()));
    }

    let report = state
        .reports
        .generate_report(title, &body.template, body.data_sources.as_deref())
        .await;

    Ok(Json(ApiResponse {
        status: report.status.as_str().to_string(),
        message: format!("Report {} generated", report.id),
        data: Some(json!({ "report": report })),
    }))
}

pub async fn list_reports(State(state): State<AppState>) -> Json<ApiResponse> {
    let reports = state.reports.list_reports();
    Json(ApiResponse::success(
        format!("Found {} reports", reports.len()),
        json!({ "reports": reports }),
    ))
}

pub async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse>> {
    let report = state
        .reports
        .get_report(&id)
        .ok_or_else(|| AppError::NotFound("Report not found".into()))?;

    Ok(Json(ApiResponse::success(
        "Report found",
        json!({ "report": report }),
    )))
}

pub async fn download_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let (report, bytes) = state.reports.read_artifact(&id).await?;
    let filename = download_name(&report.id, &report.title);

    Ok((
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    ))
}

fn download_name(id: &str, title: &str) -> String {
    let slug: String = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("{id}_{slug}.html")
}
