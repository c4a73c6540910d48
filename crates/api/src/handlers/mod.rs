pub mod auth;
pub mod health;
pub mod sessions;

use axum::{http::StatusCode, Json};
use lms_auth::AuthError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}

/// Shared error mapping for authenticated (trusted-caller) endpoints.
/// Revocation failures surface with full detail; authentication-kind
/// failures stay opaque.
pub(crate) fn auth_error_to_rejection(err: AuthError) -> (StatusCode, Json<ErrorResponse>) {
    match &err {
        AuthError::RevocationFailure(msg) => {
            tracing::error!(error = %err, "revocation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("revocation_failed", msg)),
            )
        }
        AuthError::Validation(msg) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("invalid_request", msg)),
        ),
        e if e.is_retryable() => {
            tracing::warn!(error = %err, "transient storage error");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse::new(
                    "temporarily_unavailable",
                    "Please retry the request",
                )),
            )
        }
        e if e.is_authentication_failure() => {
            tracing::warn!(kind = %err, "request rejected");
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("unauthorized", "Authentication required")),
            )
        }
        _ => {
            tracing::error!(error = %err, "request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("internal_error", "Internal server error")),
            )
        }
    }
}
