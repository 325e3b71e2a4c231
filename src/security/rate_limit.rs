//! Per-client rate limiting.
//!
//! Fixed window counter keyed by client IP: at most `max` requests per
//! `window`. Responses carry `x-ratelimit-*` headers; rejected ones also carry
//! `Retry-After`.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;

use crate::config::RateLimitConfig;
use crate::http::response::json_error;
use crate::observability::metrics;

const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Counter for one client in the current window.
#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Result of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitOutcome {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the client's window resets.
    pub reset_after: Duration,
}

/// Shared rate limiter state.
pub struct RateLimiterState {
    windows: DashMap<IpAddr, Window>,
    enabled: bool,
    max: u32,
    window: Duration,
}

impl RateLimiterState {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            enabled: config.enabled,
            max: config.max,
            window: Duration::from_secs(config.window_secs),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn check(&self, client: IpAddr) -> RateLimitOutcome {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: IpAddr, now: Instant) -> RateLimitOutcome {
        let mut entry = self.windows.entry(client).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }

        let allowed = entry.count < self.max;
        if allowed {
            entry.count += 1;
        }

        RateLimitOutcome {
            allowed,
            limit: self.max,
            remaining: self.max.saturating_sub(entry.count),
            reset_after: self.window.saturating_sub(now.duration_since(entry.started)),
        }
    }

    /// Drop windows that have already expired.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.windows
            .retain(|_, w| now.duration_since(w.started) < self.window);
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

fn apply_headers(headers: &mut HeaderMap, outcome: &RateLimitOutcome) {
    let reset_secs = outcome.reset_after.as_secs_f64().ceil() as u64;
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(outcome.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(outcome.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset_secs));
    if !outcome.allowed {
        headers.insert(header::RETRY_AFTER, HeaderValue::from(reset_secs));
    }
}

pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<RateLimiterState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.is_enabled() {
        return next.run(request).await;
    }

    let outcome = state.check(addr.ip());

    let mut response = if outcome.allowed {
        next.run(request).await
    } else {
        tracing::warn!(client = %addr.ip(), limit = outcome.limit, "Rate limit exceeded");
        metrics::record_rate_limited();
        json_error(StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded, retry later.")
    };

    apply_headers(response.headers_mut(), &outcome);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::connect_info::MockConnectInfo, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn limiter(max: u32, window_secs: u64) -> RateLimiterState {
        RateLimiterState::new(&RateLimitConfig {
            enabled: true,
            max,
            window_secs,
        })
    }

    #[test]
    fn test_counts_per_client() {
        let state = limiter(2, 60);
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();
        let now = Instant::now();

        assert_eq!(state.check_at(a, now).remaining, 1);
        assert_eq!(state.check_at(a, now).remaining, 0);
        let third = state.check_at(a, now);
        assert!(!third.allowed);
        assert_eq!(third.remaining, 0);

        assert!(state.check_at(b, now).allowed);
        assert_eq!(state.tracked_clients(), 2);
    }

    #[test]
    fn test_window_resets() {
        let state = limiter(1, 60);
        let client: IpAddr = "10.0.0.1".parse().unwrap();
        let start = Instant::now();

        assert!(state.check_at(client, start).allowed);
        assert!(!state.check_at(client, start + Duration::from_secs(59)).allowed);
        assert!(state.check_at(client, start + Duration::from_secs(60)).allowed);
    }

    #[test]
    fn test_reset_after_counts_down() {
        let state = limiter(5, 60);
        let client: IpAddr = "10.0.0.1".parse().unwrap();
        let start = Instant::now();

        state.check_at(client, start);
        let later = state.check_at(client, start + Duration::from_secs(20));
        assert_eq!(later.reset_after, Duration::from_secs(40));
    }

    #[test]
    fn test_purge_keeps_live_windows() {
        let state = limiter(5, 60);
        state.check("10.0.0.1".parse().unwrap());
        state.purge_expired();
        assert_eq!(state.tracked_clients(), 1);
    }

    #[tokio::test]
    async fn test_middleware_rejects_over_limit() {
        let state = Arc::new(limiter(1, 60));
        let app = Router::new()
            .route("/api/x", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(state, rate_limit_middleware))
            .layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 9], 4000))));

        let first = app
            .clone()
            .oneshot(Request::get("/api/x").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers().get("x-ratelimit-remaining").unwrap(), "0");

        let second = app
            .oneshot(Request::get("/api/x").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers().get(header::RETRY_AFTER).unwrap(), "60");
        assert_eq!(second.headers().get("x-ratelimit-limit").unwrap(), "1");
    }
}
