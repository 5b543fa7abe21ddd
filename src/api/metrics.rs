//! Prometheus metrics endpoint and HTTP request tracking middleware.
//!
//! This module provides:
//! - A `/metrics` endpoint that returns Prometheus-formatted metrics
//! - Middleware for tracking HTTP request counts and durations
//! - Helper functions to record order, batch and reconcile metrics

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;

use crate::db::{OrderKind, OrderStatus};
use crate::AppState;

// Metric names as constants for consistency
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const DEPLOYMENT_ORDERS_TOTAL: &str = "deployment_orders_total";
pub const DEPLOYMENT_ORDERS_BY_STATUS: &str = "deployment_orders_by_status";
pub const BATCHES_SUBMITTED_TOTAL: &str = "batches_submitted_total";
pub const BATCH_SUBMISSION_FAILURES_TOTAL: &str = "batch_submission_failures_total";
pub const BATCHES_ADVANCED_TOTAL: &str = "batches_advanced_total";
pub const RECONCILE_CYCLES_TOTAL: &str = "reconcile_cycles_total";
pub const RECONCILE_ORDERS_CHECKED: &str = "reconcile_orders_checked";

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// This should be called once during application startup.
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    describe_counter!(
        HTTP_REQUESTS_TOTAL,
        "Total number of HTTP requests received"
    );
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(
        DEPLOYMENT_ORDERS_TOTAL,
        "Total number of deployment orders created by kind"
    );
    describe_gauge!(
        DEPLOYMENT_ORDERS_BY_STATUS,
        "Number of stored deployment orders per status"
    );
    describe_counter!(
        BATCHES_SUBMITTED_TOTAL,
        "Total number of batches fully submitted to the runtime service"
    );
    describe_counter!(
        BATCH_SUBMISSION_FAILURES_TOTAL,
        "Total number of batches whose submission failed"
    );
    describe_counter!(
        BATCHES_ADVANCED_TOTAL,
        "Total number of times an order moved on to its next batch"
    );
    describe_counter!(RECONCILE_CYCLES_TOTAL, "Total number of reconcile cycles");
    describe_gauge!(
        RECONCILE_ORDERS_CHECKED,
        "Orders examined by the most recent reconcile cycle"
    );

    Ok(handle)
}

/// GET /metrics - Returns Prometheus-formatted metrics.
///
/// This endpoint is accessible without authentication.
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    update_gauge_metrics(&state).await;

    match state.metrics_handle.as_ref() {
        Some(h) => (StatusCode::OK, h.render()),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Metrics not initialized".to_string(),
        ),
    }
}

/// Refresh the per-status order gauge from the database.
async fn update_gauge_metrics(state: &AppState) {
    let counts: Vec<(String, i64)> = match sqlx::query_as(
        "SELECT status, COUNT(*) FROM deployment_orders GROUP BY status",
    )
    .fetch_all(&state.db)
    .await
    {
        Ok(counts) => counts,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to count deployment orders");
            return;
        }
    };

    for status in [
        OrderStatus::WaitDeploy,
        OrderStatus::Deploying,
        OrderStatus::Canceled,
        OrderStatus::Failed,
        OrderStatus::Ok,
    ] {
        let count = counts
            .iter()
            .find(|(s, _)| s == status.as_str())
            .map(|(_, c)| *c)
            .unwrap_or(0);
        gauge!(DEPLOYMENT_ORDERS_BY_STATUS, "status" => status.as_str()).set(count as f64);
    }
}

/// Middleware to track HTTP request metrics.
///
/// Records:
/// - `http_requests_total` counter with method, path, and status labels
/// - `http_request_duration_seconds` histogram with method and path labels
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();

    // Extract path pattern (use matched path for templates like /orders/:id)
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

/// Record a newly created deployment order.
pub fn record_order_created(kind: OrderKind) {
    counter!(DEPLOYMENT_ORDERS_TOTAL, "kind" => kind.as_str()).increment(1);
}

/// Record a batch whose runtimes were all submitted.
pub fn record_batch_submitted() {
    counter!(BATCHES_SUBMITTED_TOTAL).increment(1);
}

/// Record a batch whose submission stopped at a failed runtime.
pub fn record_batch_failed() {
    counter!(BATCH_SUBMISSION_FAILURES_TOTAL).increment(1);
}

pub fn record_batch_advanced() {
    counter!(BATCHES_ADVANCED_TOTAL).increment(1);
}

/// Record a finished reconcile cycle.
pub fn record_reconcile_cycle(orders_checked: usize) {
    counter!(RECONCILE_CYCLES_TOTAL).increment(1);
    gauge!(RECONCILE_ORDERS_CHECKED).set(orders_checked as f64);
}
