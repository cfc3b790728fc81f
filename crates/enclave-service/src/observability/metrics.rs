//! Metrics definitions for Enclave.
//!
//! All metrics follow Prometheus naming conventions:
//! - `enclave_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: HTTP verbs
//! - `endpoint`: parameterized paths, unknown paths collapse to `/other`
//! - `status`: success, error, timeout
//! - `outcome`: delivered, dropped
//! - `kind`: direct, group
//! - `level`: guard access levels

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// HTTP histogram buckets (seconds).
const HTTP_BUCKETS: &[f64] = &[
    0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
];

/// Provisioning histogram buckets (seconds).
const PROVISION_BUCKETS: &[f64] = &[0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500];

/// Build the Prometheus recorder used by Enclave.
fn builder() -> Result<PrometheusBuilder, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("enclave_http_request".to_string()),
            HTTP_BUCKETS,
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("enclave_room_provision".to_string()),
            PROVISION_BUCKETS,
        )
        .map_err(|e| format!("Failed to set provisioning buckets: {e}"))
}

/// Install the global Prometheus recorder and return its handle.
///
/// Must be called once, before any metrics are recorded.
///
/// # Errors
///
/// Returns error if a recorder is already installed.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    builder()?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

/// Build a handle without installing it globally (tests and harnesses).
pub fn detached_metrics_handle() -> Result<PrometheusHandle, String> {
    Ok(builder()?.build_recorder().handle())
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `enclave_http_requests_total`, `enclave_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("enclave_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("enclave_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        100..=399 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to prevent label cardinality explosion.
///
/// Numeric id segments become `{id}`; anything outside the API collapses
/// to `/other`.
pub fn normalize_endpoint(path: &str) -> String {
    match path {
        "/health" | "/metrics" => return path.to_string(),
        _ => {}
    }

    if !path.starts_with("/v1/") {
        return "/other".to_string();
    }

    let segments: Vec<&str> = path
        .trim_end_matches('/')
        .split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
                "{id}"
            } else {
                segment
            }
        })
        .collect();

    let normalized = segments.join("/");
    match normalized.as_str() {
        "/v1/rooms"
        | "/v1/rooms/{id}"
        | "/v1/rooms/{id}/members"
        | "/v1/rooms/{id}/members/{id}"
        | "/v1/rooms/{id}/messages"
        | "/v1/messages/{id}"
        | "/v1/messages/{id}/media"
        | "/v1/media"
        | "/v1/media/{id}"
        | "/v1/notifications"
        | "/v1/notifications/{id}"
        | "/v1/notifications/subscribe" => normalized,
        _ => "/other".to_string(),
    }
}

// ============================================================================
// Notification Metrics
// ============================================================================

/// Metric: `enclave_notifications_published_total`
pub fn record_notification_published() {
    counter!("enclave_notifications_published_total").increment(1);
}

/// Record per-sink delivery results of one publish.
///
/// Metric: `enclave_notification_deliveries_total`
/// Labels: `outcome` ("delivered", "dropped")
pub fn record_notification_delivery(outcome: &'static str, count: usize) {
    if count == 0 {
        return;
    }
    counter!("enclave_notification_deliveries_total", "outcome" => outcome)
        .increment(count as u64);
}

/// Metric: `enclave_active_subscriptions`
pub fn set_active_subscriptions(count: usize) {
    gauge!("enclave_active_subscriptions").set(count as f64);
}

// ============================================================================
// Provisioning & Authorization Metrics
// ============================================================================

/// Record a room provisioning attempt.
///
/// Metric: `enclave_rooms_provisioned_total`, `enclave_room_provision_duration_seconds`
/// Labels: `kind` ("direct", "group"), `status` ("success", "error")
pub fn record_room_provisioned(kind: &'static str, status: &'static str, duration: Duration) {
    histogram!("enclave_room_provision_duration_seconds", "kind" => kind)
        .record(duration.as_secs_f64());

    counter!("enclave_rooms_provisioned_total",
        "kind" => kind,
        "status" => status
    )
    .increment(1);
}

/// Metric: `enclave_authorization_denied_total`
/// Labels: `level`
pub fn record_authorization_denied(level: &'static str) {
    counter!("enclave_authorization_denied_total", "level" => level).increment(1);
}
