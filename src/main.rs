use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use classroom_exchange::config::Config;
use classroom_exchange::health::{api_health, health};
use classroom_exchange::ws::ws_handler;
use classroom_exchange::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(%err, "refusing to start");
            std::process::exit(1);
        }
    };

    tracing::info!("classroom exchange starting up");

    let state = Arc::new(AppState::new(config.admin_password.clone()));

    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any).allow_origin(
        match config.cors_origin.as_str() {
            "*" => tower_http::cors::AllowOrigin::any(),
            origin => match origin.parse::<HeaderValue>() {
                Ok(value) => tower_http::cors::AllowOrigin::exact(value),
                Err(_) => {
                    tracing::warn!(%origin, "CORS_ORIGIN is not a valid header value, falling back to permissive");
                    tower_http::cors::AllowOrigin::any()
                }
            },
        },
    );

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/api/health", get(api_health))
        .layer(cors)
        .with_state(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr).await.expect("failed to bind listener");
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    tracing::info!("shutdown signal received");
}
