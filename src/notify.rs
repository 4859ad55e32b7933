//! Best-effort e-mail delivery of finished reports through the SendGrid v3 API.

use std::path::Path;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::{Value, json};
use thiserror::Error;

use crate::config::Config;
use crate::pipeline::{Report, ReportService};

const SENDGRID_BASE_URL: &str = "https://api.sendgrid.com";
const MAIL_SEND_ENDPOINT: &str = "/v3/mail/send";

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Mail request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Mail API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Report document unavailable: {0}")]
    Read(String),

    #[error("Invalid API key header: {0}")]
    InvalidKey(String),
}

pub struct ReportNotifier {
    client: reqwest::Client,
    base_url: String,
    from: String,
    recipients: Vec<String>,
}

impl ReportNotifier {
    /// `None` when no API key or no recipients are configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>, NotifyError> {
        if config.sendgrid_api_key.is_empty() || config.default_recipients.is_empty() {
            return Ok(None);
        }
        Self::new(
            &config.sendgrid_api_key,
            &config.from_email,
            config.default_recipients.clone(),
        )
        .map(Some)
    }

    pub fn new(api_key: &str, from: &str, recipients: Vec<String>) -> Result<Self, NotifyError> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| NotifyError::InvalidKey(e.to_string()))?;
        headers.insert(AUTHORIZATION, value);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: SENDGRID_BASE_URL.to_string(),
            from: from.to_string(),
            recipients,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    /// Reads the finished document for `report` from `service` and mails it.
    pub async fn deliver(&self, service: &ReportService, report: &Report) -> Result<(), NotifyError> {
        let (report, document) = service
            .read_artifact(&report.id)
            .await
            .map_err(|e| NotifyError::Read(e.to_string()))?;
        self.send_report(&report, &document).await
    }

    #[tracing::instrument(
        name = "notify.send_report",
        skip(self, report, document),
        fields(report.id = %report.id, recipients = self.recipients.len())
    )]
    pub async fn send_report(&self, report: &Report, document: &[u8]) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, MAIL_SEND_ENDPOINT))
            .json(&self.message(report, document))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!("Report e-mailed");
        Ok(())
    }

    fn message(&self, report: &Report, document: &[u8]) -> Value {
        let to: Vec<Value> = self
            .recipients
            .iter()
            .map(|email| json!({ "email": email }))
            .collect();

        json!({
            "personalizations": [{ "to": to }],
            "from": { "email": self.from },
            "subject": format!("{} ({})", report.title, report.id),
            "content": [{
                "type": "text/plain",
                "value": format!(
                    "Your scheduled report \"{}\" ({}) is attached.",
                    report.title, report.id
                ),
            }],
            "attachments": [{
                "content": STANDARD.encode(document),
                "filename": attachment_name(report),
                "type": "text/html",
                "disposition": "attachment",
            }],
        })
    }
}

fn attachment_name(report: &Report) -> String {
    report
        .output_path
        .as_deref()
        .and_then(|p| Path::new(p).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{}.html", report.id))
}
