use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use super::filters;
use super::model::{Cell, Metric, ReportModel, Section, StyleClass, TableBlock};
use crate::sources::Table;

/// Raw tables collected for one attempt, keyed by source name.
pub type RawDataset = BTreeMap<String, Table>;

#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("{source_name}: missing column `{column}`")]
    MissingColumn { source_name: String, column: String },

    #[error("{source_name}: column `{column}` has non-numeric value {value} in row {row}")]
    NonNumeric {
        source_name: String,
        column: String,
        row: usize,
        value: String,
    },
}

/// Rolls raw tables up into metrics, tables and narrative sections.
///
/// Only `sales`, `operations` and `finance` are understood; other names are
/// ignored. Output order is sales, operations, finance.
#[tracing::instrument(
    name = "pipeline_stage aggregate",
    skip(raw),
    fields(
        pipeline.stage = "aggregate",
        aggregate.sources = raw.len(),
        aggregate.metrics,
        aggregate.tables,
        aggregate.sections,
    )
)]
pub fn process(raw: &RawDataset) -> Result<ReportModel, AggregateError> {
    let mut model = ReportModel::default();

    if let Some(sales) = non_empty(raw, "sales") {
        aggregate_sales(sales, &mut model)?;
    }
    if let Some(operations) = non_empty(raw, "operations") {
        aggregate_operations(operations, &mut model)?;
    }
    if let Some(finance) = non_empty(raw, "finance") {
        aggregate_finance(finance, &mut model)?;
    }

    let span = tracing::Span::current();
    span.record("aggregate.metrics", model.metrics.len());
    span.record("aggregate.tables", model.tables.len());
    span.record("aggregate.sections", model.sections.len());

    Ok(model)
}

fn non_empty<'a>(raw: &'a RawDataset, name: &str) -> Option<&'a Table> {
    raw.get(name).filter(|table| !table.is_empty())
}

fn aggregate_sales(table: &Table, model: &mut ReportModel) -> Result<(), AggregateError> {
    let revenue = NumericColumn::read(table, "sales", "revenue")?;
    let orders = table.len();

    model.metrics.extend([
        Metric::new("Total Revenue", filters::currency(revenue.sum())),
        Metric::new("Orders", filters::count(orders)),
        Metric::new("Avg Order Value", filters::currency(revenue.mean())),
    ]);

    let rows = group_sum(table, "sales", "region", &["revenue", "quantity"])?;
    model.tables.push(TableBlock {
        title: "Sales by Region".to_string(),
        headers: vec![
            "Region".to_string(),
            "Revenue".to_string(),
            "Units Sold".to_string(),
        ],
        rows,
    });

    Ok(())
}

fn aggregate_operations(table: &Table, model: &mut ReportModel) -> Result<(), AggregateError> {
    let total = table.len();
    let mut completed = 0;
    for row in table.rows() {
        match row.get("status") {
            Some(Value::String(status)) if status == "Completed" => completed += 1,
            Some(_) => {}
            None => return Err(missing("operations", "status")),
        }
    }

    model
        .metrics
        .push(Metric::new("Completion Rate", filters::rate(completed, total)));

    // Not part of the rendered model; kept for the debug log only.
    let crosstab = priority_status_crosstab(table);
    tracing::debug!(
        priorities = crosstab.len(),
        cells = crosstab.values().map(BTreeMap::len).sum::<usize>(),
        "Computed operations priority/status breakdown"
    );

    model.sections.push(Section {
        title: "Operations Summary".to_string(),
        content: format!("Processed {total} tickets this period. {completed} completed."),
    });

    Ok(())
}

fn aggregate_finance(table: &Table, model: &mut ReportModel) -> Result<(), AggregateError> {
    let budget = NumericColumn::read(table, "finance", "budget")?.sum();
    let actual = NumericColumn::read(table, "finance", "actual")?.sum();
    let variance = actual - budget;

    // Spending under budget is the favourable outcome.
    let style = if variance < 0.0 {
        StyleClass::Positive
    } else {
        StyleClass::Negative
    };
    model
        .metrics
        .push(Metric::new("Budget Variance", filters::signed_currency(variance)).styled(style));

    let rows = group_sum(table, "finance", "category", &["budget", "actual", "variance"])?;
    model.tables.push(TableBlock {
        title: "Budget vs Actual by Category".to_string(),
        headers: vec![
            "Category".to_string(),
            "Budget".to_string(),
            "Actual".to_string(),
            "Variance".to_string(),
        ],
        rows,
    });

    Ok(())
}

/// Counts of tickets per `priority` then `status`. Rows without a priority are skipped.
pub fn priority_status_crosstab(table: &Table) -> BTreeMap<String, BTreeMap<String, usize>> {
    let mut counts: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
    for row in table.rows() {
        let (Some(priority), Some(status)) = (
            row.get("priority").and_then(group_key),
            row.get("status").and_then(group_key),
        ) else {
            continue;
        };
        *counts.entry(priority).or_default().entry(status).or_default() += 1;
    }
    counts
}

fn missing(source_name: &str, column: &str) -> AggregateError {
    AggregateError::MissingColumn {
        source_name: source_name.to_string(),
        column: column.to_string(),
    }
}

/// A numeric column with nulls dropped. `integral` is true when every present
/// value is a JSON integer, which decides how sums are emitted as cells.
struct NumericColumn {
    values: Vec<Option<f64>>,
    integral: bool,
}

impl NumericColumn {
    fn read(table: &Table, source_name: &str, column: &str) -> Result<Self, AggregateError> {
        let mut values = Vec::with_capacity(table.len());
        let mut integral = true;

        for (idx, row) in table.rows().iter().enumerate() {
            let value = row.get(column).ok_or_else(|| missing(source_name, column))?;
            match value {
                Value::Null => values.push(None),
                Value::Number(n) => {
                    integral &= n.is_i64() || n.is_u64();
                    values.push(n.as_f64());
                }
                other => {
                    return Err(AggregateError::NonNumeric {
                        source_name: source_name.to_string(),
                        column: column.to_string(),
                        row: idx,
                        value: other.to_string(),
                    });
                }
            }
        }

        Ok(Self { values, integral })
    }

    fn sum(&self) -> f64 {
        self.values.iter().flatten().sum()
    }

    fn mean(&self) -> f64 {
        let present = self.values.iter().flatten().count();
        if present == 0 {
            return 0.0;
        }
        self.sum() / present as f64
    }

    fn cell(&self, total: f64) -> Cell {
        if self.integral {
            Cell::Integer(total as i64)
        } else {
            Cell::Decimal(total)
        }
    }
}

fn group_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Sums `columns` per distinct `key`, ordered ascending by key. Rows with a
/// null key are dropped.
fn group_sum(
    table: &Table,
    source_name: &str,
    key: &str,
    columns: &[&str],
) -> Result<Vec<Vec<Cell>>, AggregateError> {
    let numeric = columns
        .iter()
        .map(|column| NumericColumn::read(table, source_name, column))
        .collect::<Result<Vec<_>, _>>()?;

    let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (idx, row) in table.rows().iter().enumerate() {
        let key_value = row.get(key).ok_or_else(|| missing(source_name, key))?;
        let Some(group) = group_key(key_value) else {
            continue;
        };
        let sums = groups
            .entry(group)
            .or_insert_with(|| vec![0.0; numeric.len()]);
        for (sum, column) in sums.iter_mut().zip(&numeric) {
            *sum += column.values[idx].unwrap_or(0.0);
        }
    }

    Ok(groups
        .into_iter()
        .map(|(group, sums)| {
            let mut row = Vec::with_capacity(sums.len() + 1);
            row.push(Cell::Text(group));
            row.extend(sums.into_iter().zip(&numeric).map(|(s, c)| c.cell(s)));
            row
        })
        .collect())
}
