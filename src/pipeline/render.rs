use chrono::{DateTime, Local};

use super::filters;
use super::model::{Cell, ReportModel};
use super::templates::{
    FALLBACK, RenderError, TemplateContext, TemplateStore, TemplateValue, escape_html,
    render_template,
};
use crate::telemetry::metrics::RENDER_FALLBACKS;

/// Style sheet shared by every document. Only the two tokens below are
/// substituted; everything else is literal CSS.
const STYLE_SHEET: &str = r#"
@page {
    size: letter;
    margin: 1in;
    @top-center {
        content: "{{ company_name }}";
        font-size: 10pt;
        color: #666;
    }
    @bottom-center {
        content: "Page " counter(page) " of " counter(pages);
        font-size: 10pt;
        color: #666;
    }
}

body {
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
    font-size: 11pt;
    line-height: 1.5;
    color: #1a1a1a;
}

.header {
    border-bottom: 3px solid {{ primary_color }};
    padding-bottom: 20px;
    margin-bottom: 30px;
}

.logo { max-height: 50px; margin-bottom: 10px; }

h1 { color: {{ primary_color }}; font-size: 24pt; margin: 0; }

h2 {
    color: {{ primary_color }};
    font-size: 16pt;
    border-bottom: 1px solid #e5e5e5;
    padding-bottom: 10px;
    margin-top: 30px;
}

.meta { color: #666; font-size: 10pt; margin-top: 5px; }

table { width: 100%; border-collapse: collapse; margin: 20px 0; font-size: 10pt; }

th {
    background: {{ primary_color }};
    color: white;
    text-align: left;
    padding: 10px;
    font-weight: 600;
}

td { padding: 8px 10px; border-bottom: 1px solid #e5e5e5; }

tr:nth-child(even) { background: #f9fafb; }

.metric-card {
    display: inline-block;
    width: 22%;
    margin: 1%;
    padding: 15px;
    background: #f3f4f6;
    border-radius: 8px;
    text-align: center;
}

.metric-value { font-size: 24pt; font-weight: bold; color: {{ primary_color }}; }

.metric-label { font-size: 9pt; color: #666; text-transform: uppercase; }

.positive { color: #22c55e; }
.negative { color: #ef4444; }
.neutral { color: #6b7280; }

.footer {
    margin-top: 40px;
    padding-top: 20px;
    border-top: 1px solid #e5e5e5;
    font-size: 9pt;
    color: #666;
    text-align: center;
}
"#;

#[derive(Debug, Clone)]
pub struct Branding {
    pub company_name: String,
    pub logo_url: String,
    pub accent_color: String,
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            company_name: "Your Company".to_string(),
            logo_url: String::new(),
            accent_color: "#3b82f6".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub bytes: Vec<u8>,
    /// Set when the requested template failed and the fallback was used.
    pub fallback_reason: Option<String>,
}

pub struct Renderer {
    templates: TemplateStore,
    branding: Branding,
}

impl Renderer {
    pub fn new(templates: TemplateStore, branding: Branding) -> Self {
        Self {
            templates,
            branding,
        }
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    pub fn style_sheet(&self) -> String {
        STYLE_SHEET
            .replace("{{ company_name }}", &self.branding.company_name)
            .replace("{{ primary_color }}", &self.branding.accent_color)
    }

    /// Renders `model` with the named template. Never fails: a missing or
    /// broken template yields the fallback document explaining why.
    #[tracing::instrument(
        name = "pipeline_stage render",
        skip(self, model),
        fields(pipeline.stage = "render", render.fallback = false, render.bytes)
    )]
    pub fn render(&self, template_name: &str, title: &str, model: &ReportModel) -> RenderedDocument {
        let generated_at = Local::now();
        let ctx = self.context(template_name, title, model, generated_at);
        let span = tracing::Span::current();

        let (html, fallback_reason) = match self.render_named(template_name, &ctx) {
            Ok(html) => (html, None),
            Err(e) => {
                tracing::error!(template = template_name, error = %e, "Failed to render template");
                RENDER_FALLBACKS.add(1, &[]);
                span.record("render.fallback", true);
                let reason = e.to_string();
                (self.fallback(&ctx, &reason), Some(reason))
            }
        };

        let bytes = inject_styles(&html, &self.style_sheet()).into_bytes();
        span.record("render.bytes", bytes.len());

        RenderedDocument {
            bytes,
            fallback_reason,
        }
    }

    fn render_named(&self, template_name: &str, ctx: &TemplateContext) -> Result<String, RenderError> {
        let source = self.templates.load(template_name)?;
        render_template(&source, ctx)
    }

    fn fallback(&self, ctx: &TemplateContext, reason: &str) -> String {
        let mut ctx = ctx.clone();
        ctx.insert("reason", TemplateValue::Text(reason.to_string()));
        render_template(FALLBACK, &ctx).unwrap_or_else(|e| {
            // Only reachable if FALLBACK itself references an unknown variable.
            format!(
                "<!DOCTYPE html><html><head></head><body><p>{}</p></body></html>",
                escape_html(&e.to_string())
            )
        })
    }

    fn context(
        &self,
        template_name: &str,
        title: &str,
        model: &ReportModel,
        generated_at: DateTime<Local>,
    ) -> TemplateContext {
        let mut ctx = TemplateContext::new();
        ctx.insert("title", TemplateValue::Text(title.to_string()));
        ctx.insert("template", TemplateValue::Text(template_name.to_string()));
        ctx.insert(
            "company_name",
            TemplateValue::Text(self.branding.company_name.clone()),
        );
        ctx.insert(
            "company_logo_url",
            TemplateValue::Text(self.branding.logo_url.clone()),
        );
        ctx.insert(
            "primary_color",
            TemplateValue::Text(self.branding.accent_color.clone()),
        );
        ctx.insert(
            "generated_at",
            TemplateValue::Text(generated_at.format("%B %d, %Y at %I:%M %p").to_string()),
        );
        ctx.insert(
            "metric_count",
            TemplateValue::Number(model.metrics.len() as f64),
        );
        ctx.insert("table_count", TemplateValue::Number(model.tables.len() as f64));
        ctx.insert(
            "section_count",
            TemplateValue::Number(model.sections.len() as f64),
        );
        ctx.insert("logo", TemplateValue::Html(self.logo_html()));
        ctx.insert("metrics", TemplateValue::Html(metrics_html(model)));
        ctx.insert("tables", TemplateValue::Html(tables_html(model)));
        ctx.insert("sections", TemplateValue::Html(sections_html(model)));
        ctx
    }

    fn logo_html(&self) -> String {
        if self.branding.logo_url.is_empty() {
            return String::new();
        }
        format!(
            r#"<img class="logo" src="{}" alt="{}">"#,
            escape_html(&self.branding.logo_url),
            escape_html(&self.branding.company_name)
        )
    }
}

fn inject_styles(html: &str, css: &str) -> String {
    let style = format!("<style>{css}</style>");
    match html.find("</head>") {
        Some(pos) => format!("{}{}{}", &html[..pos], style, &html[pos..]),
        None => format!("<head>{style}</head>\n{html}"),
    }
}

fn metrics_html(model: &ReportModel) -> String {
    if model.metrics.is_empty() {
        return String::new();
    }
    let mut out = String::from("<div class=\"metrics\">\n");
    for metric in &model.metrics {
        let class = metric
            .style
            .map(|s| format!(" {}", s.as_str()))
            .unwrap_or_default();
        out.push_str(&format!(
            "  <div class=\"metric-card\"><div class=\"metric-value{}\">{}</div><div class=\"metric-label\">{}</div></div>\n",
            class,
            escape_html(&metric.value),
            escape_html(&metric.label)
        ));
    }
    out.push_str("</div>");
    out
}

fn tables_html(model: &ReportModel) -> String {
    let mut out = String::new();
    for table in &model.tables {
        out.push_str(&format!("<h3>{}</h3>\n<table>\n<thead><tr>", escape_html(&table.title)));
        for header in &table.headers {
            out.push_str(&format!("<th>{}</th>", escape_html(header)));
        }
        out.push_str("</tr></thead>\n<tbody>\n");
        for row in &table.rows {
            out.push_str("<tr>");
            for cell in row {
                out.push_str(&format!("<td>{}</td>", escape_html(&format_cell(cell))));
            }
            out.push_str("</tr>\n");
        }
        out.push_str("</tbody>\n</table>\n");
    }
    out
}

fn sections_html(model: &ReportModel) -> String {
    model
        .sections
        .iter()
        .map(|section| {
            format!(
                "<h2>{}</h2>\n<p>{}</p>\n",
                escape_html(&section.title),
                escape_html(&section.content)
            )
        })
        .collect()
}

fn format_cell(cell: &Cell) -> String {
    match cell {
        Cell::Text(text) => text.clone(),
        Cell::Integer(n) => filters::number(*n as f64),
        Cell::Decimal(n) => filters::currency(*n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::model::{Metric, Section, StyleClass, TableBlock};

    fn renderer() -> Renderer {
        Renderer::new(
            TemplateStore::builtin(),
            Branding {
                company_name: "Acme & Sons".to_string(),
                logo_url: "https://cdn.example.com/logo.png".to_string(),
                accent_color: "#112233".to_string(),
            },
        )
    }

    fn model() -> ReportModel {
        ReportModel {
            metrics: vec![
                Metric::new("Total Revenue", "$350.00"),
                Metric::new("Budget Variance", "$-100.00").styled(StyleClass::Positive),
            ],
            tables: vec![TableBlock {
                title: "Sales by Region".to_string(),
                headers: vec!["Region".into(), "Revenue".into(), "Units Sold".into()],
                rows: vec![vec![
                    Cell::Text("North".into()),
                    Cell::Decimal(1500.5),
                    Cell::Integer(1200),
                ]],
            }],
            sections: vec![Section {
                title: "Operations Summary".to_string(),
                content: "Processed 10 tickets this period. 4 completed.".to_string(),
            }],
        }
    }

    fn html(doc: &RenderedDocument) -> String {
        String::from_utf8(doc.bytes.clone()).unwrap()
    }

    #[test]
    fn test_style_sheet_substitutes_branding_tokens() {
        let css = renderer().style_sheet();
        assert!(css.contains("content: \"Acme & Sons\";"));
        assert!(css.contains("border-bottom: 3px solid #112233;"));
        assert!(!css.contains("{{"));
    }

    #[test]
    fn test_render_weekly_summary() {
        let doc = renderer().render("weekly_summary", "Weekly <Summary>", &model());
        assert!(doc.fallback_reason.is_none());

        let out = html(&doc);
        assert!(out.contains("<style>"));
        assert!(out.contains("<h1>Weekly &lt;Summary&gt;</h1>"));
        assert!(out.contains("metric-value positive\">$-100.00"));
        assert!(out.contains("<td>North</td><td>$1,500.50</td><td>1,200</td>"));
        assert!(out.contains("Processed 10 tickets this period."));
        assert!(out.contains("<img class=\"logo\" src=\"https://cdn.example.com/logo.png\""));
        assert!(out.contains("2 metrics, 1 tables."));
    }

    #[test]
    fn test_missing_template_falls_back() {
        let doc = renderer().render("does_not_exist", "Quarterly", &model());
        assert!(!doc.bytes.is_empty());
        assert!(
            doc.fallback_reason
                .as_deref()
                .unwrap()
                .contains("does_not_exist")
        );

        let out = html(&doc);
        assert!(out.contains("<h1>Quarterly</h1>"));
        assert!(out.contains("template &quot;does_not_exist&quot; was not found"));
        assert!(out.contains("<style>"));
    }

    #[test]
    fn test_broken_user_template_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.html"), "<p>{{ nope }}</p>").unwrap();
        let renderer = Renderer::new(TemplateStore::with_dir(dir.path()), Branding::default());

        let doc = renderer.render("broken", "Broken", &ReportModel::default());
        assert_eq!(doc.fallback_reason.as_deref(), Some("unknown variable `nope`"));
        assert!(html(&doc).contains("Generated by ReportGen for Your Company"));
    }

    #[test]
    fn test_template_without_head_still_gets_styles() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bare.html"), "<p>{{ title }}</p>").unwrap();
        let renderer = Renderer::new(TemplateStore::with_dir(dir.path()), Branding::default());

        let out = html(&renderer.render("bare", "Bare", &ReportModel::default()));
        assert!(out.starts_with("<head><style>"));
        assert!(out.ends_with("<p>Bare</p>"));
    }

    #[test]
    fn test_empty_model_renders_without_blocks() {
        let out = html(&renderer().render("finance_report", "Empty", &ReportModel::default()));
        assert!(!out.contains("metric-card"));
        assert!(!out.contains("<table>"));
    }
}
