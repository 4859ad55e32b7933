//! Minute-resolution cron trigger for unattended report generation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Local, Timelike};
use thiserror::Error;

use crate::notify::ReportNotifier;
use crate::pipeline::{DEFAULT_TEMPLATE, Report, ReportService, ReportStatus};

pub const SCHEDULED_TITLE: &str = "Weekly Summary Report";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CronError {
    #[error("expected 5 fields (minute hour day month weekday), got {0}")]
    FieldCount(usize),

    #[error("invalid {field} field: {value:?}")]
    InvalidField { field: &'static str, value: String },
}

#[derive(Debug, Clone, Copy)]
struct Field {
    name: &'static str,
    min: u32,
    max: u32,
}

const MINUTE: Field = Field { name: "minute", min: 0, max: 59 };
const HOUR: Field = Field { name: "hour", min: 0, max: 23 };
const DAY: Field = Field { name: "day", min: 1, max: 31 };
const MONTH: Field = Field { name: "month", min: 1, max: 12 };
// 0 and 7 are both Sunday.
const WEEKDAY: Field = Field { name: "weekday", min: 0, max: 7 };

/// A parsed `minute hour day month weekday` expression.
///
/// Supports `*`, single values, `a-b` ranges, comma lists and `/step`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minutes: u64,
    hours: u64,
    days: u64,
    months: u64,
    weekdays: u64,
    day_restricted: bool,
    weekday_restricted: bool,
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        let parts: Vec<&str> = expr.split_whitespace().collect();
        let [minute, hour, day, month, weekday] = parts[..] else {
            return Err(CronError::FieldCount(parts.len()));
        };

        let mut weekdays = parse_field(weekday, WEEKDAY)?;
        if weekdays & (1 << 7) != 0 {
            weekdays = (weekdays & !(1 << 7)) | 1;
        }

        Ok(Self {
            minutes: parse_field(minute, MINUTE)?,
            hours: parse_field(hour, HOUR)?,
            days: parse_field(day, DAY)?,
            months: parse_field(month, MONTH)?,
            weekdays,
            day_restricted: !day.starts_with('*'),
            weekday_restricted: !weekday.starts_with('*'),
        })
    }

    pub fn matches(&self, at: &DateTime<Local>) -> bool {
        let bit = |mask: u64, value: u32| mask & (1 << value) != 0;

        if !bit(self.minutes, at.minute()) || !bit(self.hours, at.hour()) {
            return false;
        }
        if !bit(self.months, at.month()) {
            return false;
        }

        let day_ok = bit(self.days, at.day());
        let weekday_ok = bit(self.weekdays, at.weekday().num_days_from_sunday());
        // Classic cron: when both day fields are restricted, either may match.
        if self.day_restricted && self.weekday_restricted {
            day_ok || weekday_ok
        } else {
            day_ok && weekday_ok
        }
    }
}

fn parse_field(expr: &str, field: Field) -> Result<u64, CronError> {
    let invalid = || CronError::InvalidField {
        field: field.name,
        value: expr.to_string(),
    };

    let mut mask = 0u64;
    for part in expr.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => (range, step.parse::<u32>().map_err(|_| invalid())?),
            None => (part, 1),
        };
        if step == 0 {
            return Err(invalid());
        }

        let (start, end) = if range == "*" {
            (field.min, field.max)
        } else if let Some((a, b)) = range.split_once('-') {
            (
                a.parse::<u32>().map_err(|_| invalid())?,
                b.parse::<u32>().map_err(|_| invalid())?,
            )
        } else {
            let value = range.parse::<u32>().map_err(|_| invalid())?;
            // `5/15` means "from 5 to the end, every 15".
            let end = if part.contains('/') { field.max } else { value };
            (value, end)
        };

        if start < field.min || end > field.max || start > end {
            return Err(invalid());
        }

        for value in (start..=end).step_by(step as usize) {
            mask |= 1 << value;
        }
    }

    Ok(mask)
}

fn until_next_minute(now: &DateTime<Local>) -> Duration {
    let elapsed_ms = u64::from(now.second()) * 1000 + u64::from(now.timestamp_subsec_millis());
    Duration::from_millis(60_000u64.saturating_sub(elapsed_ms).max(1))
}

/// Runs forever, generating the scheduled report whenever `schedule` matches
/// and mailing it through `notifier` when one is configured.
pub async fn run(
    service: Arc<ReportService>,
    schedule: CronSchedule,
    notifier: Option<ReportNotifier>,
) {
    let mut last_fired: Option<DateTime<Local>> = None;

    loop {
        tokio::time::sleep(until_next_minute(&Local::now())).await;

        let now = Local::now();
        let minute = now.with_second(0).and_then(|t| t.with_nanosecond(0));
        if !schedule.matches(&now) || minute == last_fired {
            continue;
        }
        last_fired = minute;

        run_job(&service, notifier.as_ref()).await;
    }
}

/// One scheduled run: generate the weekly summary, then mail it if it produced a document.
pub async fn run_job(service: &Arc<ReportService>, notifier: Option<&ReportNotifier>) -> Report {
    tracing::info!("Running scheduled report generation");
    let report = service
        .generate_report(SCHEDULED_TITLE, DEFAULT_TEMPLATE, None)
        .await;

    match report.status {
        ReportStatus::Completed => tracing::info!(
            report.id = %report.id,
            path = report.output_path.as_deref().unwrap_or_default(),
            "Scheduled report completed"
        ),
        _ => tracing::warn!(
            report.id = %report.id,
            error = report.error.as_deref().unwrap_or_default(),
            "Scheduled report failed"
        ),
    }

    if let Some(notifier) = notifier
        && report.output_path.is_some()
        && let Err(e) = notifier.deliver(service, &report).await
    {
        tracing::warn!(report.id = %report.id, error = %e, "Scheduled report delivery failed");
    }

    report
}
