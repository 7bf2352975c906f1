// Public API for integration tests and potential library usage

pub mod abuse;
pub mod api;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod phase;
pub mod protocol;
pub mod questions;
pub mod realtime;
pub mod resolver;
pub mod source;
pub mod state;
pub mod store;
pub mod tally;
pub mod types;
pub mod ws;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use abuse::AbuseConfig;
use state::AppState;

/// Build the full HTTP + WebSocket router
pub fn app(state: Arc<AppState>, abuse_config: Arc<AbuseConfig>) -> Router {
    // WebSocket route with anti-abuse protection
    let ws_routes = Router::new()
        .route("/ws", get(ws::ws_handler))
        .layer(middleware::from_fn_with_state(
            abuse_config,
            abuse::ws_abuse_middleware,
        ));

    let api_routes = Router::new()
        .route("/api/rooms", post(api::create_room))
        .route("/api/rooms/{code}", get(api::get_room))
        .route("/api/rooms/{code}/players", post(api::join_room))
        .route("/api/rooms/{code}/results", get(api::room_results));

    Router::new()
        .merge(ws_routes)
        .merge(api_routes)
        .route("/health", get(api::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
