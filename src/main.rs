use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use whomostlikely::{abuse, broadcast, config::AppConfig, state::AppState};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whomostlikely=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Who Most Likely...");

    let config = AppConfig::from_env();
    let port = config.port;

    // Initialize anti-abuse config
    let abuse_config = Arc::new(abuse::AbuseConfig::from_env());
    if let Some(ref throttle) = abuse_config.join_throttle {
        throttle.spawn_pruner();
    }

    let state = Arc::new(AppState::new(config));

    // Spawn background task pushing realtime vote counts to each room
    broadcast::spawn_tally_broadcaster(state.clone());

    let app = whomostlikely::app(state, abuse_config);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
