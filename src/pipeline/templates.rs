use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use super::filters;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("template \"{0}\" was not found")]
    TemplateNotFound(String),

    #[error("failed to read template \"{name}\": {source}")]
    Read {
        name: String,
        source: std::io::Error,
    },

    #[error("unknown variable `{0}`")]
    UnknownVariable(String),

    #[error("unknown filter `{0}`")]
    UnknownFilter(String),

    #[error("unterminated placeholder at byte {0}")]
    Syntax(usize),

    #[error("filter `{filter}` cannot format {value}")]
    Filter { filter: String, value: String },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TemplateInfo {
    pub id: String,
    pub name: String,
    pub description: String,
}

struct Builtin {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    source: &'static str,
}

const BUILTINS: &[Builtin] = &[
    Builtin {
        id: "weekly_summary",
        name: "Weekly Summary",
        description: "Overview of all key metrics",
        source: WEEKLY_SUMMARY,
    },
    Builtin {
        id: "sales_report",
        name: "Sales Report",
        description: "Detailed sales analysis",
        source: SALES_REPORT,
    },
    Builtin {
        id: "ops_report",
        name: "Operations Report",
        description: "Operational metrics and tickets",
        source: OPS_REPORT,
    },
    Builtin {
        id: "finance_report",
        name: "Finance Report",
        description: "Budget vs actual analysis",
        source: FINANCE_REPORT,
    },
];

const WEEKLY_SUMMARY: &str = concat!(
    "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{{ title }}</title></head>\n<body>\n",
    r#"<div class="header">
  {{ logo }}
  <h1>{{ title }}</h1>
  <p class="meta">{{ company_name }} &middot; Generated {{ generated_at }}</p>
</div>
<h2>Key Metrics</h2>
{{ metrics }}
{{ tables }}
{{ sections }}
<div class="footer">
  <p>{{ metric_count | number }} metrics, {{ table_count | number }} tables. Generated by ReportGen for {{ company_name }}</p>
</div>
"#,
    "</body>\n</html>\n"
);

const SALES_REPORT: &str = concat!(
    "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{{ title }}</title></head>\n<body>\n",
    r#"<div class="header">
  {{ logo }}
  <h1>{{ title }}</h1>
  <p class="meta">Sales analysis &middot; Generated {{ generated_at }}</p>
</div>
<h2>Sales Performance</h2>
{{ metrics }}
<h2>Breakdown</h2>
{{ tables }}
<div class="footer">
  <p>Generated by ReportGen for {{ company_name }}</p>
</div>
"#,
    "</body>\n</html>\n"
);

const OPS_REPORT: &str = concat!(
    "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{{ title }}</title></head>\n<body>\n",
    r#"<div class="header">
  {{ logo }}
  <h1>{{ title }}</h1>
  <p class="meta">Operations &middot; Generated {{ generated_at }}</p>
</div>
<h2>Operational Metrics</h2>
{{ metrics }}
{{ sections }}
<div class="footer">
  <p>Generated by ReportGen for {{ company_name }}</p>
</div>
"#,
    "</body>\n</html>\n"
);

const FINANCE_REPORT: &str = concat!(
    "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{{ title }}</title></head>\n<body>\n",
    r#"<div class="header">
  {{ logo }}
  <h1>{{ title }}</h1>
  <p class="meta">Budget vs actual &middot; Generated {{ generated_at }}</p>
</div>
<h2>Financial Position</h2>
{{ metrics }}
{{ tables }}
<div class="footer">
  <p>Generated by ReportGen for {{ company_name }}</p>
</div>
"#,
    "</body>\n</html>\n"
);

/// Minimal document used whenever the requested template cannot be rendered.
pub(crate) const FALLBACK: &str = concat!(
    "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{{ title }}</title></head>\n<body>\n",
    r#"<div class="header">
  <h1>{{ title }}</h1>
  <p class="meta">Generated: {{ generated_at }}</p>
</div>
<h2>Summary</h2>
<p>Report data is available but template "{{ template }}" could not be rendered: {{ reason }}.</p>
<div class="footer">
  <p>Generated by ReportGen for {{ company_name }}</p>
</div>
"#,
    "</body>\n</html>\n"
);

/// Looks templates up by name: `<dir>/<name>.html` first, then the built-ins.
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    dir: Option<PathBuf>,
}

impl TemplateStore {
    pub fn builtin() -> Self {
        Self { dir: None }
    }

    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    pub fn load(&self, name: &str) -> Result<Cow<'static, str>, RenderError> {
        if !is_valid_name(name) {
            return Err(RenderError::TemplateNotFound(name.to_string()));
        }

        if let Some(path) = self.user_template_path(name) {
            return std::fs::read_to_string(&path)
                .map(Cow::Owned)
                .map_err(|source| RenderError::Read {
                    name: name.to_string(),
                    source,
                });
        }

        BUILTINS
            .iter()
            .find(|b| b.id == name)
            .map(|b| Cow::Borrowed(b.source))
            .ok_or_else(|| RenderError::TemplateNotFound(name.to_string()))
    }

    pub fn list(&self) -> Vec<TemplateInfo> {
        let mut templates: Vec<TemplateInfo> = BUILTINS
            .iter()
            .map(|b| TemplateInfo {
                id: b.id.to_string(),
                name: b.name.to_string(),
                description: b.description.to_string(),
            })
            .collect();

        for id in self.user_template_ids() {
            if templates.iter().any(|t| t.id == id) {
                continue;
            }
            templates.push(TemplateInfo {
                name: id.replace('_', " "),
                description: "Custom template".to_string(),
                id,
            });
        }

        templates
    }

    fn user_template_path(&self, name: &str) -> Option<PathBuf> {
        let path = self.dir.as_deref()?.join(format!("{name}.html"));
        path.is_file().then_some(path)
    }

    fn user_template_ids(&self) -> Vec<String> {
        let Some(dir) = self.dir.as_deref() else {
            return Vec::new();
        };
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };

        let mut ids: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "html"))
            .filter_map(|path| template_id(&path))
            .collect();
        ids.sort();
        ids
    }
}

fn template_id(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| is_valid_name(stem))
        .map(str::to_string)
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// A value a template placeholder can refer to.
#[derive(Debug, Clone)]
pub enum TemplateValue {
    /// Escaped on output.
    Text(String),
    Number(f64),
    /// Pre-rendered markup, inserted verbatim.
    Html(String),
}

pub type TemplateContext = HashMap<&'static str, TemplateValue>;

/// Expands `{{ name }}` and `{{ name | filter }}` placeholders.
pub fn render_template(source: &str, ctx: &TemplateContext) -> Result<String, RenderError> {
    let mut out = String::with_capacity(source.len() * 2);
    let mut rest = source;
    let mut offset = 0;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let end = after_open
            .find("}}")
            .ok_or(RenderError::Syntax(offset + start))?;

        out.push_str(&expand(&after_open[..end], ctx)?);

        let consumed = start + 2 + end + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }
    out.push_str(rest);

    Ok(out)
}

fn expand(expr: &str, ctx: &TemplateContext) -> Result<String, RenderError> {
    let mut parts = expr.split('|').map(str::trim);
    let name = parts.next().unwrap_or_default();
    let value = ctx
        .get(name)
        .ok_or_else(|| RenderError::UnknownVariable(name.to_string()))?;

    let mut current = value.clone();
    for filter in parts {
        current = TemplateValue::Text(apply_filter(filter, &current)?);
    }

    Ok(match current {
        TemplateValue::Text(text) => escape_html(&text),
        TemplateValue::Number(n) => escape_html(&n.to_string()),
        TemplateValue::Html(html) => html,
    })
}

fn apply_filter(filter: &str, value: &TemplateValue) -> Result<String, RenderError> {
    let formatter: fn(f64) -> String = match filter {
        "currency" => filters::currency,
        "percent" => filters::percent,
        "number" => filters::number,
        other => return Err(RenderError::UnknownFilter(other.to_string())),
    };

    let number = match value {
        TemplateValue::Number(n) => Some(*n),
        TemplateValue::Text(text) if text.trim().is_empty() => Some(0.0),
        TemplateValue::Text(text) => text.trim().parse::<f64>().ok(),
        TemplateValue::Html(_) => None,
    };

    number.map(formatter).ok_or_else(|| RenderError::Filter {
        filter: filter.to_string(),
        value: match value {
            TemplateValue::Text(text) => format!("{text:?}"),
            TemplateValue::Number(n) => n.to_string(),
            TemplateValue::Html(_) => "markup".to_string(),
        },
    })
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> TemplateContext {
        let mut ctx = TemplateContext::new();
        ctx.insert("title", TemplateValue::Text("Q3 <Review>".to_string()));
        ctx.insert("revenue", TemplateValue::Number(1234.5));
        ctx.insert("rows", TemplateValue::Text("2500".to_string()));
        ctx.insert("block", TemplateValue::Html("<p>raw</p>".to_string()));
        ctx
    }

    #[test]
    fn test_render_escapes_text_and_keeps_html() {
        let out = render_template("<h1>{{ title }}</h1>{{block}}", &ctx()).unwrap();
        assert_eq!(out, "<h1>Q3 &lt;Review&gt;</h1><p>raw</p>");
    }

    #[test]
    fn test_render_applies_filters() {
        let out = render_template(
            "{{ revenue | currency }} / {{ rows | number }} / {{ revenue|percent }}",
            &ctx(),
        )
        .unwrap();
        assert_eq!(out, "$1,234.50 / 2,500 / +1234.5%");
    }

    #[test]
    fn test_unknown_variable() {
        let err = render_template("{{ missing }}", &ctx()).unwrap_err();
        assert!(matches!(err, RenderError::UnknownVariable(name) if name == "missing"));
    }

    #[test]
    fn test_unknown_filter() {
        let err = render_template("{{ revenue | upper }}", &ctx()).unwrap_err();
        assert!(matches!(err, RenderError::UnknownFilter(name) if name == "upper"));
    }

    #[test]
    fn test_filter_on_non_numeric_text() {
        let err = render_template("{{ title | currency }}", &ctx()).unwrap_err();
        assert!(matches!(err, RenderError::Filter { .. }));
    }

    #[test]
    fn test_unterminated_placeholder() {
        let err = render_template("abc {{ title }} {{ title", &ctx()).unwrap_err();
        assert!(matches!(err, RenderError::Syntax(16)));
    }

    #[test]
    fn test_builtin_templates_are_listed_and_loadable() {
        let store = TemplateStore::builtin();
        let ids: Vec<String> = store.list().into_iter().map(|t| t.id).collect();
        assert_eq!(
            ids,
            vec!["weekly_summary", "sales_report", "ops_report", "finance_report"]
        );
        for id in &ids {
            assert!(store.load(id).is_ok(), "{id}");
        }
    }

    #[test]
    fn test_missing_and_invalid_names() {
        let store = TemplateStore::builtin();
        assert!(matches!(
            store.load("quarterly"),
            Err(RenderError::TemplateNotFound(_))
        ));
        assert!(matches!(
            store.load("../secrets"),
            Err(RenderError::TemplateNotFound(_))
        ));
    }

    #[test]
    fn test_user_templates_override_builtins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("weekly_summary.html"), "custom {{ title }}").unwrap();
        std::fs::write(dir.path().join("board_pack.html"), "<p>{{ title }}</p>").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = TemplateStore::with_dir(dir.path());
        assert_eq!(store.load("weekly_summary").unwrap(), "custom {{ title }}");

        let list = store.list();
        assert_eq!(list.len(), 5);
        let custom = list.iter().find(|t| t.id == "board_pack").unwrap();
        assert_eq!(custom.name, "board pack");
    }
}
