//! Join throttling for the WebSocket endpoint
//!
//! A flaky phone reconnecting in a loop would otherwise re-run the welcome
//! catch-up and flip its presence on every attempt, spamming the whole room
//! with roster updates. Attempts are counted per (room, token) in fixed
//! windows.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, Request, Response, StatusCode},
    middleware::Next,
    response::IntoResponse,
};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

use crate::config::{env_flag, env_parse};
use crate::ws::WsQuery;

/// Attempts seen in the current window
#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    hits: u32,
}

impl Window {
    fn new(now: Instant) -> Self {
        Self {
            started: now,
            hits: 0,
        }
    }

    fn expired(&self, now: Instant, length: Duration) -> bool {
        now.duration_since(self.started) >= length
    }
}

#[derive(Debug, Clone)]
pub struct JoinThrottle {
    windows: Arc<RwLock<HashMap<String, Window>>>,
    max_attempts: u32,
    window: Duration,
}

impl JoinThrottle {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
            max_attempts,
            window,
        }
    }

    /// Count one attempt for `key`. Returns false once the window is full.
    pub async fn admit(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.write().await;
        let window = windows
            .entry(key.to_string())
            .or_insert_with(|| Window::new(now));

        if window.expired(now, self.window) {
            *window = Window::new(now);
        }
        if window.hits >= self.max_attempts {
            return false;
        }
        window.hits += 1;
        true
    }

    /// Forget keys that have been quiet for a full window
    pub async fn prune(&self) {
        let now = Instant::now();
        let length = self.window;
        self.windows
            .write()
            .await
            .retain(|_, w| !w.expired(now, length * 2));
    }

    pub fn spawn_pruner(&self) {
        let throttle = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(throttle.window * 6).await;
                throttle.prune().await;
            }
        });
    }
}

#[derive(Debug, Clone, Default)]
pub struct AbuseConfig {
    /// None = throttling disabled
    pub join_throttle: Option<JoinThrottle>,
}

impl AbuseConfig {
    /// Reads `WML_RATE_LIMIT`, `WML_RATE_LIMIT_MAX` and `WML_RATE_LIMIT_WINDOW`
    pub fn from_env() -> Self {
        if !env_flag("WML_RATE_LIMIT", true) {
            tracing::info!("WebSocket join throttling disabled");
            return Self::default();
        }

        let max_attempts: u32 = env_parse("WML_RATE_LIMIT_MAX", 30).max(1);
        let window_secs: u64 = env_parse("WML_RATE_LIMIT_WINDOW", 10).max(1);
        tracing::info!(
            "WebSocket joins limited to {} per {}s per player",
            max_attempts,
            window_secs
        );

        Self {
            join_throttle: Some(JoinThrottle::new(
                max_attempts,
                Duration::from_secs(window_secs),
            )),
        }
    }
}

/// "ROOM:token", or None when the request is missing either (the upgrade
/// handler rejects those itself)
fn throttle_key(request: &Request<Body>) -> Option<String> {
    let Query(params) = Query::<WsQuery>::try_from_uri(request.uri()).ok()?;
    Some(format!("{}:{}", params.room?.to_uppercase(), params.token?))
}

fn too_many_joins(retry_after: Duration) -> Response<Body> {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, retry_after.as_secs().to_string())],
        "Too many reconnects, wait a moment before rejoining",
    )
        .into_response()
}

pub async fn ws_abuse_middleware(
    State(config): State<Arc<AbuseConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    if let (Some(throttle), Some(key)) = (&config.join_throttle, throttle_key(&request)) {
        if !throttle.admit(&key).await {
            tracing::warn!("Throttled WebSocket join for {}", key);
            return too_many_joins(throttle.window);
        }
    }

    next.run(request).await
}
