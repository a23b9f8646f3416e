//! Inbound sliding-window rate limiting
//!
//! Each client may make at most `max_requests` requests in any `window`. The limiter
//! keeps the timestamps of a client's recent requests; a request is admitted if
//! fewer than `max_requests` of them fall inside the window ending now.

use crate::error::{AppError, AppResult};
use crate::handlers::AppState;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Idle client windows are pruned once every this many checks
const PRUNE_EVERY: u64 = 1024;

/// Header carrying the original client address when behind a proxy
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Per-client sliding-window counter
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    max_requests: u32,
    window: Duration,
    clients: Mutex<HashMap<String, VecDeque<Instant>>>,
    checks: AtomicU64,
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: Mutex::new(HashMap::new()),
            checks: AtomicU64::new(0),
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admit or reject one request from `client_id`
    ///
    /// # Errors
    /// Returns a rate-limit error whose `retry_after` is the number of whole seconds
    /// until the oldest request in the window expires.
    pub async fn check(&self, client_id: &str) -> AppResult<()> {
        let now = Instant::now();
        let mut clients = self.clients.lock().await;

        let result = {
            let timestamps = clients.entry(client_id.to_string()).or_default();
            while timestamps
                .front()
                .is_some_and(|oldest| now.duration_since(*oldest) >= self.window)
            {
                timestamps.pop_front();
            }

            if timestamps.len() >= self.max_requests as usize {
                let age = timestamps
                    .front()
                    .map_or(Duration::ZERO, |oldest| now.duration_since(*oldest));
                let wait = self.window.saturating_sub(age).as_secs_f64().ceil() as u64;
                let retry_after = wait.max(1);
                Err(AppError::rate_limit(
                    format!("Too many requests. Please try again in {retry_after} seconds."),
                    Some(retry_after),
                ))
            } else {
                timestamps.push_back(now);
                Ok(())
            }
        };

        if self.checks.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            let before = clients.len();
            let window = self.window;
            clients.retain(|_, timestamps| {
                timestamps
                    .back()
                    .is_some_and(|newest| now.duration_since(*newest) < window)
            });
            tracing::debug!(
                pruned = before - clients.len(),
                remaining = clients.len(),
                "Pruned idle rate-limit windows"
            );
        }

        result
    }

    /// Number of clients currently tracked
    pub async fn tracked_clients(&self) -> usize {
        self.clients.lock().await.len()
    }
}

/// Identify the client: first `x-forwarded-for` entry, else peer IP, else `"unknown"`
pub fn client_id(request: &Request) -> String {
    let forwarded = request
        .headers()
        .get(FORWARDED_FOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    if let Some(client) = forwarded {
        return client.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Reject requests over the limit before they reach a handler
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_id(&request);

    match state.limiter().check(&client).await {
        Ok(()) => next.run(request).await,
        Err(error) => {
            state.metrics().record_rate_limited();
            tracing::info!(
                client = %client,
                retry_after = error.retry_after().unwrap_or_default(),
                "Request rejected by rate limiter"
            );
            error.into_response()
        }
    }
}
