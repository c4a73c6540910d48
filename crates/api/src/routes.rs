use crate::handlers::{auth, health, sessions};
use crate::middleware::auth::{require_admin, require_auth};
use crate::AppState;
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Public: login and refresh carry their own credentials.
    let public = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/health", get(health::health))
        .route("/health/ready", get(health::ready));

    // Authenticated account/session management.
    let protected = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/password", post(auth::change_password))
        .route("/auth/sessions", get(sessions::list_sessions))
        .route("/auth/sessions/:session_key", delete(sessions::revoke_session))
        .route("/auth/sessions/revoke-all", post(sessions::revoke_all_sessions))
        .route("/auth/sessions/extend", post(sessions::extend_session))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // Admin-only revocation hooks. Middleware runs bottom-up: require_auth
    // authenticates, then require_admin reads the attached context.
    let admin = Router::new()
        .route("/admin/users/:user_id/force-logout", post(sessions::force_logout))
        .route("/admin/users/:user_id/unlock", post(sessions::unlock_account))
        .route("/admin/users/:user_id/sessions", delete(sessions::purge_sessions))
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public)
        .merge(protected)
        .merge(admin)
        .with_state(state)
}
