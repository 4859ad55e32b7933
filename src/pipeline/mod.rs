pub mod aggregate;
pub mod filters;
pub mod lifecycle;
pub mod model;
pub mod output;
pub mod render;
pub mod templates;

pub use lifecycle::{DEFAULT_TEMPLATE, Report, ReportService, ReportStatus};
