use crate::handlers::ErrorResponse;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use lms_auth::{AuthContext, AuthError};
use lms_models::UserRole;
use std::sync::Arc;

/// Header carrying the long-lived opaque session token (the non-JWT path).
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

type Rejection = (StatusCode, Json<ErrorResponse>);

/// Extract the bearer token from the Authorization header, if present.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Client IP for server-side audit logging, from proxy headers.
pub fn extract_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|h| h.to_str().ok()))
        .unwrap_or("unknown")
        .trim()
        .to_string()
}

/// Mask a client address before it reaches the logs: first two IPv4 octets
/// survive, everything else is elided.
pub fn mask_ip(ip: &str) -> String {
    let octets: Vec<&str> = ip.split('.').collect();
    if octets.len() == 4 {
        format!("{}.{}.x.x", octets[0], octets[1])
    } else {
        "masked".to_string()
    }
}

/// Every authentication-kind failure collapses to this one response; which
/// kind occurred is never disclosed to the client.
fn unauthorized() -> Rejection {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new("unauthorized", "Authentication required")),
    )
}

fn reject(err: AuthError, masked_ip: &str) -> Rejection {
    if err.is_authentication_failure() {
        tracing::warn!(kind = %err, ip = masked_ip, "authentication rejected");
        return unauthorized();
    }

    if err.is_retryable() {
        tracing::warn!(error = %err, "transient storage error during authentication");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new(
                "temporarily_unavailable",
                "Please retry the request",
            )),
        );
    }

    tracing::error!(error = %err, "authentication pipeline failure");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("internal_error", "Internal server error")),
    )
}

/// Middleware requiring an authenticated session: standard bearer scheme
/// first, then the dedicated opaque session-token header. The resolved
/// `AuthContext` is attached to the request for downstream handlers.
pub async fn require_auth(
    State(state): State<Arc<crate::AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, Rejection> {
    let masked_ip = mask_ip(&extract_ip(&headers));
    let gate = &state.auth_service.gate;

    let ctx: AuthContext = if let Some(token) = extract_bearer_token(&headers) {
        gate.authenticate_bearer(token)
            .await
            .map_err(|e| reject(e, &masked_ip))?
    } else if let Some(token) = headers
        .get(SESSION_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
    {
        gate.authenticate_session_token(token)
            .await
            .map_err(|e| reject(e, &masked_ip))?
    } else {
        return Err(unauthorized());
    };

    request.extensions_mut().insert(ctx);

    Ok(next.run(request).await)
}

/// Middleware requiring an authenticated admin. Runs after `require_auth`
/// in the chain and reads the context it attached.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, Rejection> {
    let is_admin = request
        .extensions()
        .get::<AuthContext>()
        .map(|ctx| ctx.user.role == UserRole::Admin)
        .unwrap_or(false);

    if !is_admin {
        return Err((
            StatusCode::FORBIDDEN,
            Json(ErrorResponse::new(
                "insufficient_permissions",
                "This action requires an admin role",
            )),
        ));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_ip() {
        assert_eq!(mask_ip("203.0.113.7"), "203.0.x.x");
        assert_eq!(mask_ip("unknown"), "masked");
        assert_eq!(mask_ip("2001:db8::1"), "masked");
    }
}
