use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// AppError
///
/// The application-wide error taxonomy. Every denial or failure a handler can
/// produce is a value of this enum; expected denials (authentication,
/// authorization, brand resolution) are normal return values, never panics.
/// Only malformed static configuration aborts the process, and that happens
/// at startup before the router is built.
#[derive(Debug, Error)]
pub enum AppError {
    /// No valid session accompanied the request. Checked before any
    /// permission or brand logic runs.
    #[error("authentication required")]
    Unauthenticated,

    /// The session is valid but the request is not allowed. The static
    /// reason string is one of `insufficient-permission`, `brand-mismatch`
    /// or `invalid-csrf` and is surfaced to the client unchanged.
    #[error("access denied: {0}")]
    Forbidden(&'static str),

    /// The `{marca}` path segment is not one of the closed brand set.
    /// There is no fallback brand; the resource namespace does not exist.
    #[error("unknown brand")]
    InvalidBrand,

    #[error("resource not found")]
    NotFound,

    /// Rejected input: unknown permission tag, out-of-range stars,
    /// password policy violation, and the like.
    #[error("validation error: {0}")]
    Validation(String),

    /// Uniqueness violation (e.g. duplicate user email).
    #[error("conflict: {0}")]
    Conflict(&'static str),

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code included in every error body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "unauthenticated",
            AppError::Forbidden(reason) => *reason,
            AppError::InvalidBrand => "invalid-brand",
            AppError::NotFound => "not-found",
            AppError::Validation(_) => "validation",
            AppError::Conflict(_) => "conflict",
            AppError::Database(_) => "database",
            AppError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::InvalidBrand | AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Infrastructure failures are logged with full detail but reach the
        // client as a generic message.
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("database error: {:?}", e);
                "internal server error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("internal error: {}", msg);
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "status": "error",
            "code": self.code(),
            "message": message,
        }));

        (status, body).into_response()
    }
}
