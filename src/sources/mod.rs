//! Named providers of tabular data.
//!
//! Every source exposes the same two capabilities: a best-effort `connect`
//! and a `fetch` that yields a [`Table`] of JSON-object rows. The
//! [`SourceRegistry`] fans those calls out over every registered source.

pub mod demo;
pub mod registry;
pub mod remote;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use demo::{DemoKind, DemoSource};
pub use registry::{SourceInfo, SourceRegistry};
pub use remote::RemoteApiSource;

pub type Row = Map<String, Value>;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Not connected. Call connect() first.")]
    NotConnected,

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Unknown data source: {0}")]
    UnknownSource(String),
}

/// Rows of named columns. The schema is whatever the producing source emits.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Table {
    rows: Vec<Row>,
}

impl Table {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Converts a JSON array of objects into a table.
    ///
    /// Anything else (a bare object, scalars, or an array containing
    /// non-object elements) is rejected rather than coerced.
    pub fn from_json(value: Value) -> Result<Self, SourceError> {
        let Value::Array(items) = value else {
            return Err(SourceError::Malformed(format!(
                "expected a JSON array, got {}",
                json_kind(&value)
            )));
        };

        let rows = items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| match item {
                Value::Object(row) => Ok(row),
                other => Err(SourceError::Malformed(format!(
                    "row {idx} is {}, expected an object",
                    json_kind(&other)
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { rows })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Optional parameters for a fetch. Sources that take no parameters ignore it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FetchQuery {
    pub endpoint: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

#[async_trait::async_trait]
pub trait DataSource: Send + Sync {
    /// Establishes (or re-checks) the connection. Never errors; failure is `false`.
    async fn connect(&self) -> bool;

    async fn fetch(&self, query: Option<&FetchQuery>) -> Result<Table, SourceError>;

    fn kind(&self) -> &str;
}
