//! Health check handler.
//!
//! `/health` reports the instance id and whether the database answers.

use crate::models::HealthResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

/// Handler for GET /health
///
/// Returns 200 when the database answers `SELECT 1`, 503 otherwise. The
/// database error is logged, never returned.
#[tracing::instrument(skip_all, name = "enclave.health.check")]
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let db_check = sqlx::query("SELECT 1").fetch_one(&state.pool).await;

    match db_check {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                instance_id: state.config.instance_id.clone(),
                database: Some("healthy".to_string()),
            }),
        ),
        Err(e) => {
            tracing::warn!(target: "enclave.handlers.health", error = %e, "Health check failed: database error");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy".to_string(),
                    instance_id: state.config.instance_id.clone(),
                    database: Some("unhealthy".to_string()),
                }),
            )
        }
    }
}
