use chrono::{Duration, Local};
use serde_json::{Value, json};

use super::{DataSource, FetchQuery, Row, SourceError, Table};

const REGIONS: [&str; 4] = ["North", "South", "East", "West"];
const PRODUCTS: [&str; 4] = ["Widget A", "Widget B", "Service Pro", "Enterprise Suite"];
const OPS_CATEGORIES: [&str; 4] = ["Shipping", "Support", "Manufacturing", "QA"];
const OPS_STATUSES: [&str; 4] = ["Completed", "In Progress", "Delayed", "Blocked"];
const PRIORITIES: [&str; 4] = ["Low", "Medium", "High", "Critical"];
const FINANCE_CATEGORIES: [&str; 6] = [
    "Revenue",
    "COGS",
    "Marketing",
    "Payroll",
    "Operations",
    "R&D",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoKind {
    Sales,
    Operations,
    Finance,
}

impl DemoKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DemoKind::Sales => "sales",
            DemoKind::Operations => "operations",
            DemoKind::Finance => "finance",
        }
    }
}

/// Synthetic source producing a fresh, schema-stable table on every fetch.
pub struct DemoSource {
    kind: DemoKind,
    type_name: String,
    seed: Option<u64>,
}

impl DemoSource {
    pub fn new(kind: DemoKind) -> Self {
        Self {
            kind,
            type_name: format!("demo:{}", kind.as_str()),
            seed: None,
        }
    }

    /// Fixes the generator seed so repeated fetches return identical tables.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn rng(&self) -> fastrand::Rng {
        match self.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        }
    }
}

#[async_trait::async_trait]
impl DataSource for DemoSource {
    async fn connect(&self) -> bool {
        tracing::info!(source.kind = self.kind.as_str(), "Demo data source connected");
        true
    }

    async fn fetch(&self, _query: Option<&FetchQuery>) -> Result<Table, SourceError> {
        let mut rng = self.rng();
        let rows = match self.kind {
            DemoKind::Sales => sales_rows(&mut rng),
            DemoKind::Operations => operations_rows(&mut rng),
            DemoKind::Finance => finance_rows(&mut rng),
        };

        tracing::info!(
            source.kind = self.kind.as_str(),
            rows = rows.len(),
            "Fetched demo rows"
        );

        Ok(Table::new(rows))
    }

    fn kind(&self) -> &str {
        &self.type_name
    }
}

fn pick<'a>(rng: &mut fastrand::Rng, items: &[&'a str]) -> &'a str {
    items[rng.usize(..items.len())]
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn days_ago(days: i64) -> String {
    (Local::now() - Duration::days(days))
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string()
}

fn into_row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}

fn sales_rows(rng: &mut fastrand::Rng) -> Vec<Row> {
    (0..50)
        .map(|_| {
            into_row(json!({
                "date": days_ago(rng.i64(0..=30)),
                "region": pick(rng, &REGIONS),
                "product": pick(rng, &PRODUCTS),
                "quantity": rng.u32(1..=100),
                "revenue": round2(100.0 + rng.f64() * 9_900.0),
                "rep": format!("Rep {}", rng.u32(1..=10)),
            }))
        })
        .collect()
}

fn operations_rows(rng: &mut fastrand::Rng) -> Vec<Row> {
    (0..30)
        .map(|i| {
            let resolved = if rng.f64() > 0.3 {
                Value::String(days_ago(rng.i64(0..=7)))
            } else {
                Value::Null
            };
            into_row(json!({
                "ticket_id": format!("OPS-{}", 1000 + i),
                "category": pick(rng, &OPS_CATEGORIES),
                "status": pick(rng, &OPS_STATUSES),
                "created": days_ago(rng.i64(1..=14)),
                "resolved": resolved,
                "priority": pick(rng, &PRIORITIES),
            }))
        })
        .collect()
}

fn finance_rows(rng: &mut fastrand::Rng) -> Vec<Row> {
    let mut rows = Vec::with_capacity(FINANCE_CATEGORIES.len() * 3);
    for category in FINANCE_CATEGORIES {
        for month in 1..=3 {
            let budget = 50_000.0 + rng.f64() * 450_000.0;
            let actual = budget * (0.8 + rng.f64() * 0.4);
            rows.push(into_row(json!({
                "category": category,
                "month": format!("2024-{month:02}"),
                "budget": round2(budget),
                "actual": round2(actual),
                "variance": round2(actual - budget),
                "variance_pct": ((actual - budget) / budget * 1000.0).round() / 10.0,
            })));
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_demo_source_connect() {
        let source = DemoSource::new(DemoKind::Sales);
        assert!(source.connect().await);
        assert!(source.connect().await);
    }

    #[tokio::test]
    async fn test_demo_sales_schema() {
        let table = DemoSource::new(DemoKind::Sales).fetch(None).await.unwrap();
        assert_eq!(table.len(), 50);
        for row in table.rows() {
            for column in ["date", "region", "product", "quantity", "revenue", "rep"] {
                assert!(row.contains_key(column), "missing {column}");
            }
            let revenue = row["revenue"].as_f64().unwrap();
            assert!((100.0..=10_000.0).contains(&revenue));
            let quantity = row["quantity"].as_u64().unwrap();
            assert!((1..=100).contains(&quantity));
        }
    }

    #[tokio::test]
    async fn test_demo_operations_schema() {
        let table = DemoSource::new(DemoKind::Operations)
            .fetch(None)
            .await
            .unwrap();
        assert_eq!(table.len(), 30);
        assert_eq!(table.rows()[0]["ticket_id"], "OPS-1000");
        assert_eq!(table.rows()[29]["ticket_id"], "OPS-1029");
        for row in table.rows() {
            let status = row["status"].as_str().unwrap();
            assert!(OPS_STATUSES.contains(&status));
            assert!(row.contains_key("priority"));
        }
    }

    #[tokio::test]
    async fn test_demo_finance_schema() {
        let table = DemoSource::new(DemoKind::Finance).fetch(None).await.unwrap();
        assert_eq!(table.len(), 18);
        for row in table.rows() {
            let budget = row["budget"].as_f64().unwrap();
            let actual = row["actual"].as_f64().unwrap();
            assert!(actual >= budget * 0.79 && actual <= budget * 1.21);
        }
    }

    #[tokio::test]
    async fn test_seeded_source_is_repeatable() {
        let source = DemoSource::new(DemoKind::Finance).with_seed(7);
        let first = source.fetch(None).await.unwrap();
        let second = source.fetch(None).await.unwrap();
        assert_eq!(first, second);
    }
}
