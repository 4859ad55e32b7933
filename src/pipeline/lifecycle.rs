use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use chrono::{DateTime, Local, Utc};
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::Instrument;

use super::aggregate::{self, RawDataset};
use super::output::ArtifactStore;
use super::render::Renderer;
use crate::error::{AppError, AppResult};
use crate::sources::SourceRegistry;
use crate::telemetry::metrics::{
    REPORT_GENERATION_COUNT, REPORT_GENERATION_DURATION, REPORT_ROWS_PROCESSED,
    SOURCE_FETCH_ERRORS,
};

pub const DEFAULT_TEMPLATE: &str = "weekly_summary";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Generating => "generating",
            ReportStatus::Completed => "completed",
            ReportStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportStatus::Completed | ReportStatus::Failed)
    }
}

/// One generation attempt.
///
/// Serialises to the stable shape consumed by the HTTP layer; the artifact
/// location keeps its historical `pdf_path` key.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub id: String,
    pub title: String,
    pub template: String,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(rename = "pdf_path")]
    pub output_path: Option<String>,
    pub error: Option<String>,
    pub metadata: Map<String, Value>,
    #[serde(skip)]
    seq: u64,
}

impl Report {
    fn generating(seq: u64, title: &str, template: &str) -> Self {
        Self {
            id: format!("RPT-{seq:04}"),
            title: title.to_string(),
            template: template.to_string(),
            status: ReportStatus::Generating,
            created_at: Utc::now(),
            completed_at: None,
            output_path: None,
            error: None,
            metadata: Map::new(),
            seq,
        }
    }

    fn complete(&mut self, output: Completion) {
        if self.status.is_terminal() {
            return;
        }
        self.status = ReportStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.output_path = Some(output.path);
        self.metadata = output.metadata;
    }

    fn fail(&mut self, error: &AppError) {
        if self.status.is_terminal() {
            return;
        }
        self.status = ReportStatus::Failed;
        self.error = Some(error.to_string());
    }
}

struct Completion {
    path: String,
    metadata: Map<String, Value>,
}

/// Owns the catalog of attempts and runs the fetch, aggregate, render, write pipeline.
pub struct ReportService {
    registry: Arc<SourceRegistry>,
    renderer: Arc<Renderer>,
    artifacts: ArtifactStore,
    catalog: RwLock<HashMap<String, Report>>,
    counter: AtomicU64,
}

impl ReportService {
    pub fn new(registry: Arc<SourceRegistry>, renderer: Arc<Renderer>, artifacts: ArtifactStore) -> Self {
        Self {
            registry,
            renderer,
            artifacts,
            catalog: RwLock::new(HashMap::new()),
            counter: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Runs one attempt to completion. Always returns the report; failures
    /// are reported through `status` and `error`, never as an `Err`.
    ///
    /// The attempt runs on its own task, so dropping the returned future does
    /// not cancel it: the catalog entry still reaches a terminal status.
    ///
    /// `source_names` of `None` (or an empty list) means every registered source.
    #[tracing::instrument(
        name = "pipeline report",
        skip(self, source_names),
        fields(report.id, report.status, report.duration_ms)
    )]
    pub async fn generate_report(
        self: &Arc<Self>,
        title: &str,
        template: &str,
        source_names: Option<&[String]>,
    ) -> Report {
        let seq = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let report = Report::generating(seq, title, template);
        self.store(&report);

        let id = report.id.clone();
        tracing::Span::current().record("report.id", id.as_str());
        tracing::info!(report.id = %id, title, "Generating report");

        let service = Arc::clone(self);
        let source_names = source_names.map(<[String]>::to_vec);
        let task = tokio::spawn(
            async move { service.attempt(report, source_names).await }.in_current_span(),
        );

        match task.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(report.id = %id, error = %e, "Report generation task died");
                let mut report = self
                    .get_report(&id)
                    .unwrap_or_else(|| Report::generating(seq, title, template));
                report.fail(&AppError::Internal(format!("generation task failed: {e}")));
                self.store(&report);
                REPORT_GENERATION_COUNT.add(1, &[KeyValue::new("status", report.status.as_str())]);
                report
            }
        }
    }

    async fn attempt(&self, mut report: Report, source_names: Option<Vec<String>>) -> Report {
        let start = Instant::now();

        match self
            .run_attempt(&report.id, &report.title, &report.template, source_names.as_deref())
            .await
        {
            Ok(completion) => {
                report.complete(completion);
                tracing::info!(report.id = %report.id, "Report completed");
            }
            Err(e) => {
                tracing::error!(report.id = %report.id, error = %e, "Report generation failed");
                report.fail(&e);
            }
        }
        self.store(&report);

        let duration = start.elapsed();
        let status_kv = KeyValue::new("status", report.status.as_str());
        REPORT_GENERATION_COUNT.add(1, std::slice::from_ref(&status_kv));
        REPORT_GENERATION_DURATION.record(duration.as_secs_f64(), &[status_kv]);
        let span = tracing::Span::current();
        span.record("report.status", report.status.as_str());
        span.record("report.duration_ms", duration.as_millis() as u64);

        report
    }

    async fn run_attempt(
        &self,
        report_id: &str,
        title: &str,
        template: &str,
        source_names: Option<&[String]>,
    ) -> AppResult<Completion> {
        self.registry.connect_all().await;

        let targets: Vec<String> = match source_names {
            Some(names) if !names.is_empty() => names.to_vec(),
            _ => self.registry.names(),
        };

        let raw = self.fetch_sources(&targets).await;
        let rows_processed: usize = raw.values().map(|table| table.len()).sum();
        REPORT_ROWS_PROCESSED.record(rows_processed as f64, &[]);

        let model = aggregate::process(&raw)?;

        let renderer = Arc::clone(&self.renderer);
        let (template_name, doc_title) = (template.to_string(), title.to_string());
        let document =
            tokio::task::spawn_blocking(move || renderer.render(&template_name, &doc_title, &model))
                .await
                .map_err(|e| AppError::Internal(format!("render task failed: {e}")))?;

        let path = self.artifacts.artifact_path(report_id, Local::now());
        self.artifacts.write(&path, &document.bytes).await?;

        // Counts everything pulled, including sources the template never shows.
        let mut metadata = Map::new();
        metadata.insert("sources".to_string(), json!(targets));
        metadata.insert("rows_processed".to_string(), json!(rows_processed));

        Ok(Completion {
            path: path.to_string_lossy().into_owned(),
            metadata,
        })
    }

    /// Fetches each target; a source that fails (or is unknown) is left out.
    #[tracing::instrument(
        name = "pipeline_stage fetch",
        skip(self, targets),
        fields(pipeline.stage = "fetch", fetch.requested = targets.len(), fetch.succeeded)
    )]
    async fn fetch_sources(&self, targets: &[String]) -> RawDataset {
        let mut raw = RawDataset::new();
        for name in targets {
            match self.registry.fetch(name, None).await {
                Ok(table) => {
                    raw.insert(name.clone(), table);
                }
                Err(e) => {
                    tracing::warn!(source = %name, error = %e, "Failed to fetch from source");
                    SOURCE_FETCH_ERRORS.add(1, &[KeyValue::new("source", name.clone())]);
                }
            }
        }
        tracing::Span::current().record("fetch.succeeded", raw.len());
        raw
    }

    fn store(&self, report: &Report) {
        self.catalog
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(report.id.clone(), report.clone());
    }

    pub fn get_report(&self, id: &str) -> Option<Report> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Most recent first.
    pub fn list_reports(&self) -> Vec<Report> {
        let mut reports: Vec<Report> = self
            .catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        reports.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.seq.cmp(&a.seq))
        });
        reports
    }

    /// The finished document for a completed report.
    pub async fn read_artifact(&self, id: &str) -> AppResult<(Report, Vec<u8>)> {
        let report = self
            .get_report(id)
            .ok_or_else(|| AppError::NotFound(format!("Report {id} not found")))?;

        if report.status != ReportStatus::Completed {
            return Err(AppError::NotReady(format!(
                "Report {id} is {}",
                report.status.as_str()
            )));
        }

        let path = report
            .output_path
            .as_deref()
            .ok_or_else(|| AppError::Internal(format!("Report {id} has no document")))?;
        let bytes = self.artifacts.read(Path::new(path)).await?;

        Ok((report, bytes))
    }
}
