use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use super::{DataSource, DemoKind, DemoSource, FetchQuery, RemoteApiSource, SourceError, Table};
use crate::config::Config;
use crate::telemetry::metrics::SOURCE_FETCH_ERRORS;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SourceInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Name-keyed collection of sources. Registering an existing name replaces it.
#[derive(Default)]
pub struct SourceRegistry {
    sources: BTreeMap<String, Arc<dyn DataSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock registry: demo sales/operations/finance sources, plus an
    /// `api` remote source when live mode is configured.
    pub fn from_config(config: &Config) -> Result<Self, SourceError> {
        let mut registry = Self::new();
        registry.register("sales", DemoSource::new(DemoKind::Sales));
        registry.register("operations", DemoSource::new(DemoKind::Operations));
        registry.register("finance", DemoSource::new(DemoKind::Finance));

        if config.live_mode()
            && let Some(base_url) = config.api_base_url.as_deref()
        {
            registry.register("api", RemoteApiSource::new(base_url, &config.api_key)?);
        }

        Ok(registry)
    }

    pub fn register(&mut self, name: impl Into<String>, source: impl DataSource + 'static) {
        self.register_arc(name, Arc::new(source));
    }

    pub fn register_arc(&mut self, name: impl Into<String>, source: Arc<dyn DataSource>) {
        let name = name.into();
        if self.sources.insert(name.clone(), source).is_some() {
            tracing::warn!(source = %name, "Replaced existing data source");
        } else {
            tracing::info!(source = %name, "Registered data source");
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    pub fn describe(&self) -> Vec<SourceInfo> {
        self.sources
            .iter()
            .map(|(name, source)| SourceInfo {
                id: name.clone(),
                kind: source.kind().to_string(),
            })
            .collect()
    }

    #[tracing::instrument(name = "sources.connect_all", skip(self))]
    pub async fn connect_all(&self) -> BTreeMap<String, bool> {
        let mut results = BTreeMap::new();
        for (name, source) in &self.sources {
            let ok = source.connect().await;
            if !ok {
                tracing::warn!(source = %name, "Data source failed to connect");
            }
            results.insert(name.clone(), ok);
        }
        results
    }

    pub async fn fetch(&self, name: &str, query: Option<&FetchQuery>) -> Result<Table, SourceError> {
        let source = self
            .sources
            .get(name)
            .ok_or_else(|| SourceError::UnknownSource(name.to_string()))?;
        source.fetch(query).await
    }

    /// Fetches every source. A failing source contributes an empty table.
    #[tracing::instrument(name = "sources.fetch_all", skip(self))]
    pub async fn fetch_all(&self) -> BTreeMap<String, Table> {
        let mut results = BTreeMap::new();
        for (name, source) in &self.sources {
            let table = match source.fetch(None).await {
                Ok(table) => table,
                Err(e) => {
                    tracing::error!(source = %name, error = %e, "Failed to fetch from source");
                    SOURCE_FETCH_ERRORS.add(1, &[opentelemetry::KeyValue::new("source", name.clone())]);
                    Table::empty()
                }
            };
            results.insert(name.clone(), table);
        }
        results
    }
}
