//! Application-wide error types.
//!
//! Every failure kind is recovered at the boundary of the single operation
//! that raised it; nothing is retried automatically except notification
//! delivery, which is fire-and-forget and handled inside the sink.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Malformed or out-of-range input; recoverable by caller correction.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced entity is absent.
    #[error("Not found: {0}")]
    NotFound(&'static str),

    /// Ownership or role violation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Uniqueness violation: evidence already pledged, correlation id reused.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Operation illegal for the entity's current lifecycle state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The single most important business invariant: an investment must
    /// never push the funded amount past the requested total.
    #[error(
        "Overfunding: investing {amount} would exceed the requested total \
         ({funded_amount} of {requested_amount} already funded)"
    )]
    Overfunding {
        requested_amount: i64,
        funded_amount: i64,
        amount: i64,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Error response body.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            LedgerError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            LedgerError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            LedgerError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            LedgerError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            LedgerError::InvalidState(_) => (StatusCode::BAD_REQUEST, "INVALID_STATE"),
            LedgerError::Overfunding { .. } => (StatusCode::BAD_REQUEST, "OVERFUNDING"),
            LedgerError::Database(_) | LedgerError::Migrate(_) | LedgerError::Config(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("internal error: {self}");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code,
        };

        (status, Json(body)).into_response()
    }
}
