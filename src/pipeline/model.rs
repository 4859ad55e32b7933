use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleClass {
    Positive,
    Negative,
    Neutral,
}

impl StyleClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            StyleClass::Positive => "positive",
            StyleClass::Negative => "negative",
            StyleClass::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub label: String,
    pub value: String,
    #[serde(rename = "class", skip_serializing_if = "Option::is_none")]
    pub style: Option<StyleClass>,
}

impl Metric {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            style: None,
        }
    }

    pub fn styled(mut self, style: StyleClass) -> Self {
        self.style = Some(style);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Text(String),
    Integer(i64),
    Decimal(f64),
}

impl Cell {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Text(_) => None,
            Cell::Integer(v) => Some(*v as f64),
            Cell::Decimal(v) => Some(*v),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableBlock {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub title: String,
    pub content: String,
}

/// Aggregation output: everything a template can show.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportModel {
    pub metrics: Vec<Metric>,
    pub tables: Vec<TableBlock>,
    pub sections: Vec<Section>,
}

impl ReportModel {
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty() && self.tables.is_empty() && self.sections.is_empty()
    }

    pub fn metric(&self, label: &str) -> Option<&Metric> {
        self.metrics.iter().find(|m| m.label == label)
    }

    pub fn table(&self, title: &str) -> Option<&TableBlock> {
        self.tables.iter().find(|t| t.title == title)
    }
}
