//! Error handling for the Shop Floor Inventory service
//!
//! Maps ledger, storage and request failures onto consistent JSON responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::{ErrorKind, LedgerError};
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Invalid token")]
    InvalidToken,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Stock and procurement rule failures
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    // Lost update or allocation race, safe to retry
    #[error("Concurrent update conflict: {0}")]
    ConcurrencyConflict(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[source] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Whether the caller may retry the whole operation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ConcurrencyConflict(_))
    }
}

/// Unique constraints whose violation means two writers raced for the same slot
const RACE_CONSTRAINTS: &[&str] = &[
    "purchase_orders_order_number_key",
    "purchase_order_sequences_pkey",
];

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            let code = db_err.code();
            match code.as_deref() {
                // serialization_failure, deadlock_detected
                Some("40001") | Some("40P01") => {
                    return AppError::ConcurrencyConflict(db_err.message().to_string());
                }
                // unique_violation
                Some("23505") => {
                    let constraint = db_err.constraint().unwrap_or("unique").to_string();
                    if RACE_CONSTRAINTS.contains(&constraint.as_str()) {
                        return AppError::ConcurrencyConflict(constraint);
                    }
                    return AppError::DuplicateEntry(constraint);
                }
                _ => {}
            }
        }
        AppError::DatabaseError(err)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let (field, message) = errors
            .field_errors()
            .into_iter()
            .next()
            .map(|(field, errs)| {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| format!("{} is invalid", field));
                (field.to_string(), message)
            })
            .unwrap_or_else(|| ("input".to_string(), "Invalid input".to_string()));

        AppError::Validation { field, message }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub retryable: bool,
}

impl ErrorDetail {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field: None,
            retryable: false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("INVALID_TOKEN", "Invalid token"),
            ),
            AppError::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("UNAUTHORIZED", message.clone()),
            ),
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    field: Some(field.clone()),
                    ..ErrorDetail::new("VALIDATION_ERROR", message.clone())
                },
            ),
            AppError::DuplicateEntry(what) => (
                StatusCode::CONFLICT,
                ErrorDetail::new("DUPLICATE_ENTRY", format!("Duplicate entry: {}", what)),
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new("NOT_FOUND", format!("{} not found", resource)),
            ),
            AppError::Ledger(err) => {
                let status = match err.kind() {
                    ErrorKind::Validation => StatusCode::BAD_REQUEST,
                    ErrorKind::InvariantViolation => StatusCode::UNPROCESSABLE_ENTITY,
                };
                (status, ErrorDetail::new(err.code(), err.to_string()))
            }
            AppError::ConcurrencyConflict(_) => (
                StatusCode::CONFLICT,
                ErrorDetail {
                    retryable: true,
                    ..ErrorDetail::new(
                        "CONCURRENCY_CONFLICT",
                        "The resource was modified concurrently. Please retry.",
                    )
                },
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("DATABASE_ERROR", "A database error occurred"),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", "An internal server error occurred"),
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        } else {
            tracing::warn!(code = %error_detail.code, "request rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
