pub mod config;
pub mod error;
pub mod notify;
pub mod pipeline;
pub mod routes;
pub mod scheduler;
pub mod sources;
pub mod telemetry;

use std::sync::Arc;

pub use config::Config;

use pipeline::ReportService;
use pipeline::output::ArtifactStore;
use pipeline::render::Renderer;
use pipeline::templates::TemplateStore;
use sources::{SourceError, SourceRegistry};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub reports: Arc<ReportService>,
}

impl AppState {
    /// Wires the registry, renderer and artifact store described by `config`.
    pub fn from_config(config: Config) -> Result<Self, SourceError> {
        let registry = SourceRegistry::from_config(&config)?;
        let renderer = Renderer::new(
            TemplateStore::with_dir(config.templates_dir.clone()),
            config.branding(),
        );
        let reports = ReportService::new(
            Arc::new(registry),
            Arc::new(renderer),
            ArtifactStore::new(config.reports_dir.clone()),
        );

        Ok(Self {
            config,
            reports: Arc::new(reports),
        })
    }
}
