use crate::handlers::ErrorResponse;
use crate::middleware::auth::extract_ip;
use crate::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use lms_auth::{AuthContext, AuthError, LoginRequest, LoginResponse, RefreshTokenRequest, SessionClass};
use lms_models::ChangePassword;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

type Rejection = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Deserialize)]
pub struct ApiLoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub session_class: SessionClass,
    pub device_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RevokedResponse {
    pub revoked: u64,
}

/// Map service errors on the login path. Unlike token validation, the
/// login path may tell the caller that the account is temporarily locked:
/// they are presenting a password, not a bearer token.
fn login_rejection(err: AuthError) -> Rejection {
    match err {
        AuthError::AccountLocked { .. } => (
            StatusCode::FORBIDDEN,
            Json(ErrorResponse::new(
                "account_locked",
                "Account temporarily locked due to repeated failed logins",
            )),
        ),
        AuthError::Validation(msg) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("invalid_request", &msg)),
        ),
        e if e.is_authentication_failure() => (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new(
                "invalid_credentials",
                "Invalid email or password",
            )),
        ),
        e => internal_rejection(e),
    }
}

/// Everything outside the login path collapses auth-kind failures into one
/// opaque rejection.
fn opaque_rejection(err: AuthError) -> Rejection {
    if err.is_authentication_failure() {
        tracing::warn!(kind = %err, "request rejected");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("unauthorized", "Authentication required")),
        );
    }
    if let AuthError::Validation(msg) = &err {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("invalid_request", msg)),
        );
    }
    internal_rejection(err)
}

fn internal_rejection(err: AuthError) -> Rejection {
    if err.is_retryable() {
        tracing::warn!(error = %err, "transient storage error");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new(
                "temporarily_unavailable",
                "Please retry the request",
            )),
        );
    }
    tracing::error!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("internal_error", "Internal server error")),
    )
}

/// Login with email and password
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ApiLoginRequest>,
) -> Result<Json<LoginResponse>, Rejection> {
    let user_agent = headers
        .get("user-agent")
        .and_then(|h| h.to_str().ok())
        .map(String::from);

    let response = state
        .auth_service
        .login(LoginRequest {
            email: request.email,
            password: request.password,
            session_class: request.session_class,
            ip_address: Some(extract_ip(&headers)),
            user_agent,
            device_type: request.device_type,
        })
        .await
        .map_err(login_rejection)?;

    Ok(Json(response))
}

/// Rotate a refresh token into a fresh session and token pair
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RefreshTokenRequest>,
) -> Result<Json<LoginResponse>, Rejection> {
    let response = state
        .auth_service
        .refresh(request)
        .await
        .map_err(opaque_rejection)?;

    Ok(Json(response))
}

/// Revoke the current session
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<StatusCode, Rejection> {
    state
        .auth_service
        .logout(&ctx)
        .await
        .map_err(opaque_rejection)?;

    Ok(StatusCode::NO_CONTENT)
}

/// Change password; every other session for the account is revoked, the
/// one making the change survives.
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(request): Json<ChangePassword>,
) -> Result<Json<RevokedResponse>, Rejection> {
    let revoked = state
        .auth_service
        .change_password(&ctx, request)
        .await
        .map_err(opaque_rejection)?;

    Ok(Json(RevokedResponse { revoked }))
}
