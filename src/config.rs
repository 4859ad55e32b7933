use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub environment: String,
    pub demo_mode: bool,
    pub api_base_url: Option<String>,
    pub api_key: String,
    pub company_name: String,
    pub company_logo_url: String,
    pub primary_color: String,
    pub reports_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub report_schedule: String,
    pub otel_service_name: String,
    pub otel_exporter_endpoint: Option<String>,
    pub sendgrid_api_key: String,
    pub from_email: String,
    pub default_recipients: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            port: env::var("APP_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .expect("APP_PORT must be a number"),
            environment: env::var("REPORTGEN_ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
            demo_mode: parse_bool(&env::var("DEMO_MODE").unwrap_or_default())
                .expect("DEMO_MODE must be true or false"),
            api_base_url: env::var("API_BASE_URL").ok().filter(|v| !v.is_empty()),
            api_key: env::var("API_KEY").unwrap_or_default(),
            company_name: env::var("COMPANY_NAME").unwrap_or_else(|_| "Your Company".to_string()),
            company_logo_url: env::var("COMPANY_LOGO_URL").unwrap_or_default(),
            primary_color: env::var("PRIMARY_COLOR").unwrap_or_else(|_| "#3b82f6".to_string()),
            reports_dir: env::var("REPORTS_DIR")
                .unwrap_or_else(|_| "reports".to_string())
                .into(),
            templates_dir: env::var("TEMPLATES_DIR")
                .unwrap_or_else(|_| "templates".to_string())
                .into(),
            report_schedule: env::var("REPORT_SCHEDULE")
                .unwrap_or_else(|_| "0 7 * * 1".to_string()),
            otel_service_name: env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| "report-generator".to_string()),
            otel_exporter_endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .ok()
                .filter(|v| !v.is_empty()),
            sendgrid_api_key: env::var("SENDGRID_API_KEY").unwrap_or_default(),
            from_email: env::var("FROM_EMAIL")
                .unwrap_or_else(|_| "reports@example.com".to_string()),
            default_recipients: parse_list(&env::var("DEFAULT_RECIPIENTS").unwrap_or_default()),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Remote sources are only wired up when a base URL is configured and demo mode is off.
    pub fn live_mode(&self) -> bool {
        !self.demo_mode && self.api_base_url.is_some()
    }

    pub fn branding(&self) -> crate::pipeline::render::Branding {
        crate::pipeline::render::Branding {
            company_name: self.company_name.clone(),
            logo_url: self.company_logo_url.clone(),
            accent_color: self.primary_color.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            environment: "development".to_string(),
            demo_mode: false,
            api_base_url: None,
            api_key: String::new(),
            company_name: "Your Company".to_string(),
            company_logo_url: String::new(),
            primary_color: "#3b82f6".to_string(),
            reports_dir: "reports".into(),
            templates_dir: "templates".into(),
            report_schedule: "0 7 * * 1".to_string(),
            otel_service_name: "report-generator".to_string(),
            otel_exporter_endpoint: None,
            sendgrid_api_key: String::new(),
            from_email: "reports@example.com".to_string(),
            default_recipients: Vec::new(),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Some(false),
        "1" | "true" | "yes" | "on" => Some(true),
        _ => None,
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}
