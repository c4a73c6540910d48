// LMS API Server
// REST surface for the learning platform's authentication core

mod config;
mod handlers;
mod middleware;
mod routes;

use config::Config;
use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub struct AppState {
    pub auth_service: lms_auth::AuthService,
    pub database: lms_database::Database,
    pub cache: lms_cache::Cache,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,lms_api=debug,tower_http=debug".to_string()),
        )
        .init();

    tracing::info!("Starting LMS API server");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::from_env();
    tracing::info!("Server: {}:{}", config.server_host, config.server_port);

    // Initialize database
    let database = lms_database::Database::new(config.database.clone())
        .await
        .expect("Failed to connect to database");
    database.ping().await.expect("Database ping failed");
    tracing::info!("Database connected");

    // Initialize cache
    let cache = lms_cache::Cache::new(config.cache.clone())
        .await
        .expect("Failed to connect to Redis");
    cache.ping().await.expect("Redis ping failed");
    tracing::info!("Redis connected");

    // Create auth service
    let auth_service =
        lms_auth::AuthService::new(database.clone(), cache.clone(), config.auth.clone());
    tracing::info!("Auth service initialized");

    let state = Arc::new(AppState {
        auth_service,
        database: database.clone(),
        cache,
    });

    // Background maintenance: expiry sweep + attempt-log retention.
    spawn_cleanup_loop(state.clone(), config.cleanup_interval_secs);

    // Build router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodic sweep deactivating expired sessions in bounded batches and
/// pruning login-attempt rows past retention.
fn spawn_cleanup_loop(state: Arc<AppState>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        // First tick fires immediately; skip it so startup load settles.
        interval.tick().await;

        loop {
            interval.tick().await;

            match state.auth_service.revocation.cleanup_expired().await {
                Ok(count) if count > 0 => {
                    tracing::info!(deactivated = count, "expired session cleanup");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "expired session cleanup failed");
                }
            }

            if let Err(e) = state.auth_service.revocation.prune_attempt_log().await {
                tracing::error!(error = %e, "attempt log pruning failed");
            }
        }
    });
}
