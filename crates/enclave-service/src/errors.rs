//! Enclave error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl.
//! Messages returned to clients are generic; storage details are logged
//! server-side only.
//!
//! `Forbidden` deliberately covers both "you lack the role" and "this room
//! does not exist": membership-gated lookups never reveal whether the target
//! exists.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Enclave error type.
///
/// Maps to HTTP status codes:
/// - Unauthorized: 401
/// - Forbidden: 403
/// - NotFound: 404
/// - Conflict: 409
/// - BadRequest: 400
/// - Database, Internal: 500
#[derive(Debug, Error)]
pub enum EnclaveError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error")]
    Internal,
}

impl EnclaveError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            EnclaveError::Unauthorized => 401,
            EnclaveError::Forbidden => 403,
            EnclaveError::NotFound(_) => 404,
            EnclaveError::Conflict(_) => 409,
            EnclaveError::BadRequest(_) => 400,
            EnclaveError::Database(_) | EnclaveError::Internal => 500,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for EnclaveError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            EnclaveError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication required".to_string(),
            ),
            EnclaveError::Forbidden => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "You do not have access to this resource".to_string(),
            ),
            EnclaveError::NotFound(resource) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", resource.clone())
            }
            EnclaveError::Conflict(reason) => (StatusCode::CONFLICT, "CONFLICT", reason.clone()),
            EnclaveError::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", reason.clone())
            }
            EnclaveError::Database(err) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "enclave.database", error = %err, "Database operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "An internal database error occurred".to_string(),
                )
            }
            EnclaveError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(error_response)).into_response()
    }
}

/// Convert sqlx errors to EnclaveError.
///
/// Constraint violations become `Conflict` so a duplicate membership or a
/// reference to an unknown user surfaces as 409 rather than a generic 500.
impl From<sqlx::Error> for EnclaveError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return EnclaveError::Conflict("Resource already exists".to_string());
            }
            if db_err.is_foreign_key_violation() {
                return EnclaveError::Conflict("Referenced resource does not exist".to_string());
            }
        }
        EnclaveError::Database(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for EnclaveError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        EnclaveError::Database(err.to_string())
    }
}
