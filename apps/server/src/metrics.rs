//! Prometheus metrics for the batch server

use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, HistogramVec,
    IntCounterVec, IntGaugeVec,
};

use portico_batch::{
    BatchResult, Error as BatchError, ExecutionHook, ExecutionMode, Operation, SubResponse,
};

lazy_static! {
    // HTTP Request Metrics

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "portico_http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .expect("Failed to register HTTP_REQUESTS_TOTAL");

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "portico_http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register HTTP_REQUEST_DURATION_SECONDS");

    /// In-flight HTTP requests
    pub static ref HTTP_REQUESTS_IN_FLIGHT: IntGaugeVec = register_int_gauge_vec!(
        "portico_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
        &["method", "path"]
    )
    .expect("Failed to register HTTP_REQUESTS_IN_FLIGHT");

    /// HTTP request body size in bytes
    pub static ref HTTP_REQUEST_SIZE_BYTES: HistogramVec = register_histogram_vec!(
        "portico_http_request_size_bytes",
        "HTTP request body size in bytes",
        &["method", "path"],
        vec![100.0, 1_000.0, 10_000.0, 100_000.0, 1_000_000.0, 10_000_000.0]
    )
    .expect("Failed to register HTTP_REQUEST_SIZE_BYTES");

    // Batch Metrics

    /// Batch calls by execution mode and outcome
    pub static ref BATCH_CALLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "portico_batch_calls_total",
        "Total number of batch calls",
        &["mode", "outcome"]
    )
    .expect("Failed to register BATCH_CALLS_TOTAL");

    /// Sub-Requests per batch call
    pub static ref BATCH_SIZE: HistogramVec = register_histogram_vec!(
        "portico_batch_size",
        "Number of Sub-Requests in a batch call",
        &["mode"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0]
    )
    .expect("Failed to register BATCH_SIZE");

    /// Batch execution duration
    pub static ref BATCH_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "portico_batch_duration_seconds",
        "Batch execution duration in seconds",
        &["mode"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to register BATCH_DURATION_SECONDS");

    /// Sub-Responses by operation and status class
    pub static ref SUB_RESPONSES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "portico_sub_responses_total",
        "Total number of Sub-Responses",
        &["mode", "operation", "status_class"]
    )
    .expect("Failed to register SUB_RESPONSES_TOTAL");

    /// Sub-Requests no route accepted
    pub static ref ROUTE_MISSES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "portico_route_misses_total",
        "Total number of Sub-Requests that matched no route",
        &["mode"]
    )
    .expect("Failed to register ROUTE_MISSES_TOTAL");
}

/// Label for a finished (or failed) batch call.
pub fn batch_outcome(result: &Result<BatchResult, BatchError>) -> &'static str {
    match result {
        Ok(result) => result.transaction.as_str(),
        Err(BatchError::Timeout(_)) => "timeout",
        Err(BatchError::InvalidBatch(_)) => "invalid",
        Err(_) => "failed",
    }
}

pub fn record_batch(mode: ExecutionMode, size: usize, elapsed: Duration, outcome: &str) {
    let mode = mode.as_str();
    BATCH_CALLS_TOTAL.with_label_values(&[mode, outcome]).inc();
    BATCH_SIZE.with_label_values(&[mode]).observe(size as f64);
    BATCH_DURATION_SECONDS
        .with_label_values(&[mode])
        .observe(elapsed.as_secs_f64());
}

pub fn status_class(status: u16) -> &'static str {
    match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

/// Counts every Sub-Response the executor produces.
#[derive(Debug, Default)]
pub struct BatchMetricsHook;

impl ExecutionHook for BatchMetricsHook {
    fn on_response(
        &self,
        mode: ExecutionMode,
        operation: Option<Operation>,
        response: &SubResponse,
    ) {
        let operation = operation.map_or("unrouted", |op| op.as_str());
        SUB_RESPONSES_TOTAL
            .with_label_values(&[mode.as_str(), operation, status_class(response.status_code)])
            .inc();
        if operation == "unrouted" && response.status_code == 501 {
            ROUTE_MISSES_TOTAL.with_label_values(&[mode.as_str()]).inc();
        }
    }
}

/// Collapse numeric path segments so labels stay low-cardinality.
pub fn sanitize_path(path: &str) -> String {
    if path.is_empty() || path == "/" {
        return "/".to_string();
    }
    path.split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
