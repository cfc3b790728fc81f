//! Prometheus metrics endpoint handler.
//!
//! The endpoint is unauthenticated so Prometheus can scrape it. Labels are
//! bounded and carry no identifiers or ciphertext.

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
///
/// ```text
/// # TYPE enclave_http_requests_total counter
/// enclave_http_requests_total{method="GET",endpoint="/v1/rooms",status_code="200"} 42
/// ```
#[tracing::instrument(skip_all, name = "enclave.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
