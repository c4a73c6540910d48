use crate::handlers::auth::RevokedResponse;
use crate::handlers::ErrorResponse;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use lms_auth::AuthContext;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::auth_error_to_rejection;

type Rejection = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub session_key: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_type: Option<String>,
    pub login_method: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub current: bool,
}

#[derive(Debug, Deserialize)]
pub struct ExtendRequest {
    pub hours: i64,
}

#[derive(Debug, Serialize)]
pub struct ExtendResponse {
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: u64,
}

/// List the caller's currently valid sessions
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Vec<SessionInfo>>, Rejection> {
    let sessions = state
        .auth_service
        .list_sessions(ctx.user.id)
        .await
        .map_err(auth_error_to_rejection)?;

    let infos = sessions
        .into_iter()
        .map(|s| SessionInfo {
            current: s.session_key == ctx.session.session_key,
            session_key: s.session_key,
            ip_address: s.ip_address,
            user_agent: s.user_agent,
            device_type: s.device_type,
            login_method: s.login_method,
            created_at: s.created_at,
            last_activity: s.last_activity,
            expires_at: s.expires_at,
        })
        .collect();

    Ok(Json(infos))
}

/// Revoke one of the caller's sessions by key. 404 when no matching active
/// session exists for this account; keys owned by other accounts look the
/// same.
pub async fn revoke_session(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(session_key): Path<String>,
) -> Result<StatusCode, Rejection> {
    let revoked = state
        .auth_service
        .revocation
        .revoke_one(ctx.user.id, &session_key)
        .await
        .map_err(auth_error_to_rejection)?;

    if revoked {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("not_found", "No matching active session")),
        ))
    }
}

/// Revoke all of the caller's other sessions, keeping the current one
pub async fn revoke_all_sessions(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<RevokedResponse>, Rejection> {
    let revoked = state
        .auth_service
        .revocation
        .revoke_all(ctx.user.id, Some(&ctx.session.session_key))
        .await
        .map_err(auth_error_to_rejection)?;

    Ok(Json(RevokedResponse { revoked }))
}

/// Extend the current session; requests beyond the cap are clamped
pub async fn extend_session(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(request): Json<ExtendRequest>,
) -> Result<Json<ExtendResponse>, Rejection> {
    let expires_at = state
        .auth_service
        .extend_session(&ctx, request.hours)
        .await
        .map_err(auth_error_to_rejection)?;

    Ok(Json(ExtendResponse { expires_at }))
}

/// Admin: revoke every session for an account
pub async fn force_logout(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<RevokedResponse>, Rejection> {
    let revoked = state
        .auth_service
        .force_logout(user_id)
        .await
        .map_err(auth_error_to_rejection)?;

    Ok(Json(RevokedResponse { revoked }))
}

/// Admin: clear an account's lockout and failure counter regardless of
/// the lock's expiry
pub async fn unlock_account(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, Rejection> {
    state
        .auth_service
        .lockout
        .unlock(user_id)
        .await
        .map_err(auth_error_to_rejection)?;

    Ok(StatusCode::NO_CONTENT)
}

/// Admin: revoke and hard-delete all session rows for a deleted account
pub async fn purge_sessions(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<DeletedResponse>, Rejection> {
    let deleted = state
        .auth_service
        .revocation
        .purge_account(user_id)
        .await
        .map_err(auth_error_to_rejection)?;

    Ok(Json(DeletedResponse { deleted }))
}
