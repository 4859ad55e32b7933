use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter},
};
use std::sync::LazyLock;

pub static METER: LazyLock<Meter> = LazyLock::new(|| global::meter("report-generator"));

// --- Report Pipeline Metrics ---

pub static REPORT_GENERATION_COUNT: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("report.generation.count")
        .with_description("Number of report generation attempts by terminal status")
        .with_unit("{report}")
        .build()
});

pub static REPORT_GENERATION_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("report.generation.duration")
        .with_description("Total report generation duration in seconds")
        .with_unit("s")
        .build()
});

pub static REPORT_ROWS_PROCESSED: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("report.rows_processed")
        .with_description("Number of raw rows fetched per report")
        .with_unit("{row}")
        .build()
});

pub static SOURCE_FETCH_ERRORS: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("report.source.fetch_errors")
        .with_description("Number of failed data source fetches")
        .with_unit("{error}")
        .build()
});

pub static RENDER_FALLBACKS: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("report.render.fallbacks")
        .with_description("Number of documents rendered with the fallback template")
        .with_unit("{document}")
        .build()
});

// --- HTTP Metrics ---

pub static HTTP_REQUESTS_TOTAL: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("http.requests.total")
        .with_description("Total number of HTTP requests")
        .with_unit("{request}")
        .build()
});

pub static HTTP_REQUEST_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("http.request.duration")
        .with_description("HTTP request duration in milliseconds")
        .with_unit("ms")
        .with_boundaries(vec![
            1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
        ])
        .build()
});
