use axum::{
    extract::Extension,
    http::{header, Method},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use unison_server::config::Config;
use unison_server::routes::{health_router, HealthState};
use unison_server::websocket::{ws_handler, ConnectionManager, SessionRegistry};

/// Build the CORS layer based on configuration.
///
/// With `CORS_ORIGINS` set, only those origins are allowed; otherwise a
/// permissive layer is used for development convenience.
fn build_cors_layer(config: &Config) -> CorsLayer {
    match &config.cors_allowed_origins {
        Some(origins) if !origins.is_empty() => {
            let allowed_origins: Vec<_> = origins
                .iter()
                .filter_map(|origin| {
                    origin.parse().ok().or_else(|| {
                        tracing::warn!("Invalid CORS origin '{}', skipping", origin);
                        None
                    })
                })
                .collect();

            tracing::info!(
                "CORS configured with {} allowed origin(s)",
                allowed_origins.len()
            );
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([Method::GET])
                .allow_headers([header::CONTENT_TYPE])
        }
        _ => {
            tracing::warn!(
                "Using permissive CORS. Set CORS_ORIGINS for production-like behavior."
            );
            CorsLayer::permissive()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unison_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting Unison server on port {}", config.port);

    let connections = ConnectionManager::new();
    let registry = SessionRegistry::new();

    // Spawn the idle sweep, on a fixed period independent of request
    // traffic. Sessions past their TTL and connections with a dead or
    // long-silent transport are both reclaimed here.
    let sweep_registry = registry.clone();
    let sweep_connections = connections.clone();
    let ttl_ms = (config.session_ttl_secs * 1000) as i64;
    let sweep_period = Duration::from_secs(config.sweep_interval_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_period);
        loop {
            interval.tick().await;
            let removed = sweep_registry.sweep(ttl_ms);
            let dropped = sweep_connections.cleanup_stale_connections(ttl_ms);
            if removed > 0 || dropped > 0 {
                tracing::info!(removed, dropped, "Idle sweep completed");
            }
        }
    });

    let health_state = HealthState::new(registry.clone(), connections.clone());
    let cors_layer = build_cors_layer(&config);
    let config = Arc::new(config);

    // Build the router
    let app = Router::new()
        .route("/", get(root))
        .route("/ws", get(ws_handler))
        // Nested health routes: /health, /health/live, /health/ready
        .nest("/health", health_router(health_state))
        .layer(Extension(connections))
        .layer(Extension(registry))
        .layer(Extension(config.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn root() -> &'static str {
    "Unison - synchronized listening sessions"
}
