use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use report_generator::pipeline::output::ArtifactStore;
use report_generator::pipeline::render::{Branding, Renderer};
use report_generator::pipeline::templates::TemplateStore;
use report_generator::pipeline::ReportService;
use report_generator::sources::{
    DataSource, DemoKind, DemoSource, FetchQuery, SourceError, SourceRegistry, Table,
};
use report_generator::{AppState, Config, routes};

struct Unreachable;

#[async_trait]
impl DataSource for Unreachable {
    async fn connect(&self) -> bool {
        false
    }

    async fn fetch(&self, _query: Option<&FetchQuery>) -> Result<Table, SourceError> {
        Err(SourceError::Connection("host unreachable".into()))
    }

    fn kind(&self) -> &str {
        "unreachable"
    }
}

fn state(dir: &std::path::Path, with_broken: bool) -> AppState {
    let mut registry = SourceRegistry::new();
    registry.register("sales", DemoSource::new(DemoKind::Sales).with_seed(7));
    registry.register(
        "operations",
        DemoSource::new(DemoKind::Operations).with_seed(7),
    );
    registry.register("finance", DemoSource::new(DemoKind::Finance).with_seed(7));
    if with_broken {
        registry.register("warehouse", Unreachable);
    }

    let reports = ReportService::new(
        Arc::new(registry),
        Arc::new(Renderer::new(TemplateStore::builtin(), Branding::default())),
        ArtifactStore::new(dir),
    );

    AppState {
        config: Config::default(),
        reports: Arc::new(reports),
    }
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn send_json(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn generate(body: Value) -> Request<Body> {
    Request::post("/api/reports/generate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_reports_demo_mode() {
    let tmp = tempfile::tempdir().unwrap();
    let app = routes::router(state(tmp.path(), false));

    let (status, body) = send_json(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["demo_mode"], true);
}

#[tokio::test]
async fn generate_then_fetch_and_download() {
    let tmp = tempfile::tempdir().unwrap();
    let app = routes::router(state(tmp.path(), false));

    let (status, body) = send_json(
        app.clone(),
        generate(json!({ "title": "Weekly Summary Report" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["message"], "Report RPT-0001 generated");

    let report = &body["data"]["report"];
    assert_eq!(report["id"], "RPT-0001");
    assert_eq!(report["template"], "weekly_summary");
    assert!(report["completed_at"].is_string());
    assert!(report["error"].is_null());
    assert_eq!(
        report["metadata"]["sources"],
        json!(["finance", "operations", "sales"])
    );
    assert_eq!(report["metadata"]["rows_processed"], 50 + 30 + 18);

    let (status, body) = send_json(app.clone(), get("/api/reports/RPT-0001")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["report"]["status"], "completed");

    let response = app
        .oneshot(get("/api/reports/RPT-0001/download"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("RPT-0001_Weekly_Summary_Report.html"));
    let html = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(html.to_vec()).unwrap();
    assert!(html.contains("Weekly Summary Report"));
    assert!(html.contains("Total Revenue"));
}

#[tokio::test]
async fn failing_source_does_not_fail_the_report() {
    let tmp = tempfile::tempdir().unwrap();
    let app = routes::router(state(tmp.path(), true));

    let (status, body) = send_json(
        app,
        generate(json!({
            "title": "Sales only",
            "template": "sales_report",
            "data_sources": ["sales", "warehouse"],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["data"]["report"]["metadata"]["rows_processed"], 50);
}

#[tokio::test]
async fn unknown_template_still_completes() {
    let tmp = tempfile::tempdir().unwrap();
    let app = routes::router(state(tmp.path(), false));

    let (_, body) = send_json(
        app.clone(),
        generate(json!({ "title": "Odd", "template": "does_not_exist" })),
    )
    .await;
    assert_eq!(body["status"], "completed");

    let (status, html) = send(app, get("/api/reports/RPT-0001/download")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(html).unwrap().contains("Odd"));
}

#[tokio::test]
async fn list_is_most_recent_first() {
    let tmp = tempfile::tempdir().unwrap();
    let app = routes::router(state(tmp.path(), false));

    for title in ["first", "second", "third"] {
        send_json(app.clone(), generate(json!({ "title": title }))).await;
    }

    let (status, body) = send_json(app, get("/api/reports")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Found 3 reports");
    let ids: Vec<&str> = body["data"]["reports"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["RPT-0003", "RPT-0002", "RPT-0001"]);
}

#[tokio::test]
async fn missing_report_is_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let app = routes::router(state(tmp.path(), false));

    let (status, body) = send_json(app.clone(), get("/api/reports/RPT-9999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (status, _) = send(app, get("/api/reports/RPT-9999/download")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn blank_title_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let app = routes::router(state(tmp.path(), false));

    let (status, _) = send_json(app.clone(), generate(json!({ "title": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send_json(app, get("/api/reports")).await;
    assert_eq!(body["message"], "Found 0 reports");
}

#[tokio::test]
async fn catalog_endpoints() {
    let tmp = tempfile::tempdir().unwrap();
    let app = routes::router(state(tmp.path(), true));

    let (status, body) = send_json(app.clone(), get("/api/templates")).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["data"]["templates"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"weekly_summary"));
    assert!(ids.contains(&"finance_report"));

    let (status, body) = send_json(app, get("/api/sources")).await;
    assert_eq!(status, StatusCode::OK);
    let sources = body["data"]["sources"].as_array().unwrap();
    assert_eq!(sources.len(), 4);
    assert!(sources.iter().any(|s| s["id"] == "warehouse" && s["type"] == "unreachable"));
}
