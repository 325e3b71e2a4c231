//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the Axum router: `GET /` redirect and the `/api` proxy routes
//! - Order the pre-request layers on `/api` (auth, load shedding, rate limit)
//! - Wire up global middleware (tracing, request ID, timeout, compression,
//!   security headers)
//! - Serve with graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    compression::CompressionLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use url::Url;

use crate::config::GatewayConfig;
use crate::http::dispatch::{self, Upstream};
use crate::http::request::{request_id, UuidRequestId, X_REQUEST_ID};
use crate::http::response::{json_error, SECURITY_HEADERS};
use crate::lifecycle::shutdown;
use crate::observability::metrics;
use crate::security::auth::{bearer_auth_middleware, BearerAuth};
use crate::security::headers::PROJECT_URL;
use crate::security::load_shed::{load_shed_middleware, LoadShedState};
use crate::security::rate_limit::{rate_limit_middleware, RateLimiterState};
use crate::security::{AccessConfig, AccessPolicy, ClientRequest, Decision, HeaderSanitizer, RangeTable};

/// Errors building the server from a validated configuration.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid upstream origin: {0}")]
    Upstream(#[from] url::ParseError),

    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid User-Agent value: {0}")]
    UserAgent(#[from] axum::http::header::InvalidHeaderValue),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Application state injected into the proxy handler.
#[derive(Clone)]
pub struct AppState {
    pub policy: Arc<AccessPolicy>,
    pub upstream: Upstream,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    rate_limiter: Arc<RateLimiterState>,
}

impl HttpServer {
    /// Create a server using the built-in datacenter ranges.
    pub fn new(config: GatewayConfig) -> Result<Self, ServerError> {
        Self::with_ranges(config, RangeTable::builtin())
    }

    /// Create a server checking restricted-mode callers against `ranges`.
    pub fn with_ranges(config: GatewayConfig, ranges: RangeTable) -> Result<Self, ServerError> {
        let access = AccessConfig::from(&config);
        if !access.allowed_identities.is_empty() {
            tracing::info!("Place ID list is not empty! Tracking enabled.");
        }

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        let upstream = Upstream::new(
            client,
            Url::parse(&config.upstream)?,
            HeaderSanitizer::for_package()?,
            config.max_body_bytes,
        );

        let auth = Arc::new(BearerAuth::new(access.caller_tokens.clone()));
        let load_shed = Arc::new(LoadShedState::new(&config.under_pressure));
        let rate_limiter = Arc::new(RateLimiterState::new(&config.rate_limit));

        let state = AppState {
            policy: Arc::new(AccessPolicy::new(access, ranges)),
            upstream,
        };

        let router = Self::build_router(&config, state, auth, load_shed, rate_limiter.clone());
        Ok(Self {
            router,
            rate_limiter,
        })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layers added later run first: on `/api` the order is bearer auth,
    /// load shedding, rate limiting, then the handler.
    fn build_router(
        config: &GatewayConfig,
        state: AppState,
        auth: Arc<BearerAuth>,
        load_shed: Arc<LoadShedState>,
        rate_limiter: Arc<RateLimiterState>,
    ) -> Router {
        let api = Router::new()
            .route("/api", any(proxy_handler))
            .route("/api/", any(proxy_handler))
            .route("/api/{*path}", any(proxy_handler))
            .with_state(state)
            .layer(middleware::from_fn_with_state(rate_limiter, rate_limit_middleware))
            .layer(middleware::from_fn_with_state(load_shed, load_shed_middleware))
            .layer(middleware::from_fn_with_state(auth, bearer_auth_middleware));

        let mut router = Router::new()
            .route("/", get(root_redirect))
            .merge(api)
            .fallback(not_found);

        for (name, value) in SECURITY_HEADERS {
            router = router.layer(SetResponseHeaderLayer::if_not_present(name, value));
        }

        router
            .layer(CompressionLayer::new())
            .layer(TimeoutLayer::with_status_code(
                StatusCode::GATEWAY_TIMEOUT,
                Duration::from_secs(config.request_timeout_secs),
            ))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
    }

    /// The fully layered router, for embedding or driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let (stop_tx, _) = broadcast::channel::<()>(1);

        if self.rate_limiter.is_enabled() {
            let limiter = self.rate_limiter.clone();
            let stop = stop_tx.subscribe();
            tokio::spawn(purge_rate_limits(limiter, stop));
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        let _ = stop_tx.send(());
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Periodically forget clients whose rate limit window has expired.
async fn purge_rate_limits(limiter: Arc<RateLimiterState>, mut stop: broadcast::Receiver<()>) {
    let mut interval = tokio::time::interval(limiter.window());
    loop {
        tokio::select! {
            _ = interval.tick() => limiter.purge_expired(),
            _ = stop.recv() => break,
        }
    }
}

/// `GET /` always points at the project page, whatever the policy says.
async fn root_redirect() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, PROJECT_URL)]).into_response()
}

async fn not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, "Not Found")
}

/// Evaluate the access policy and dispatch accordingly.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start_time = Instant::now();
    let request_id = request_id(request.headers()).to_string();
    let method = request.method().clone();
    let source = addr.ip().to_string();

    let decision = state
        .policy
        .decide(&ClientRequest::new(&source, request.headers()));

    match decision {
        Decision::Allow => tracing::debug!(
            request_id = %request_id,
            client = %source,
            method = %method,
            path = %request.uri().path(),
            "Proxying request"
        ),
        Decision::Deny { reason, .. } => tracing::debug!(
            request_id = %request_id,
            client = %source,
            reason = %reason,
            "Request denied by access policy"
        ),
    }

    let response = dispatch::forward(&state.upstream, request, decision).await;
    metrics::record_request(method.as_str(), response.status().as_u16(), start_time);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::connect_info::MockConnectInfo;
    use crate::security::AddressRange;
    use tower::ServiceExt;

    fn config(restricted: bool, place_ids: &[&str], api_keys: &[&str]) -> GatewayConfig {
        GatewayConfig {
            only_roblox_server: restricted,
            place_ids: place_ids.iter().map(|s| s.to_string()).collect(),
            api_keys: api_keys.iter().map(|s| s.to_string()).collect(),
            // Nothing listens here; allowed requests end in 502.
            upstream: "http://127.0.0.1:1".into(),
            ..GatewayConfig::default()
        }
    }

    fn app(config: GatewayConfig, peer: [u8; 4]) -> Router {
        let ranges = RangeTable::new(vec![AddressRange::cidr([203, 0, 113, 0], 24)]);
        HttpServer::with_ranges(config, ranges)
            .unwrap()
            .router()
            .layer(MockConnectInfo(SocketAddr::from((peer, 5000))))
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_root_redirects_regardless_of_policy() {
        let configs = [
            config(true, &["100"], &["key"]),
            config(false, &[], &[]),
        ];
        for cfg in configs {
            let response = app(cfg, [8, 8, 8, 8])
                .oneshot(Request::get("/").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::FOUND);
            assert_eq!(response.headers().get(header::LOCATION).unwrap(), PROJECT_URL);
        }
    }

    #[tokio::test]
    async fn test_outside_address_is_forbidden() {
        let response = app(config(true, &[], &[]), [8, 8, 8, 8])
            .oneshot(Request::get("/api/v10/gateway").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            json_body(response).await["error"],
            dispatch::DENY_MESSAGE
        );
    }

    #[tokio::test]
    async fn test_identity_and_range_are_both_required() {
        let request = || {
            Request::get("/api/v10/gateway")
                .header("roblox-id", "100")
                .body(Body::empty())
                .unwrap()
        };

        let outside = app(config(true, &["100"], &[]), [8, 8, 8, 8])
            .oneshot(request())
            .await
            .unwrap();
        assert_eq!(outside.status(), StatusCode::FORBIDDEN);

        // Allowed through the policy; the dead upstream turns it into a 502.
        let inside = app(config(true, &["100"], &[]), [203, 0, 113, 7])
            .oneshot(request())
            .await
            .unwrap();
        assert_eq!(inside.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_missing_identity_is_forbidden_in_range() {
        let response = app(config(true, &["100"], &[]), [203, 0, 113, 7])
            .oneshot(Request::get("/api/x").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_loopback_peer_is_allowed() {
        let response = app(config(true, &["100"], &[]), [127, 0, 0, 1])
            .oneshot(Request::get("/api/x").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_api_root_with_trailing_slash_is_proxied() {
        // Reaches the dispatcher (502 from the dead upstream), not the fallback.
        for path in ["/api", "/api/"] {
            let response = app(config(false, &[], &[]), [8, 8, 8, 8])
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_GATEWAY, "{path}");
        }
    }

    #[tokio::test]
    async fn test_dot_segments_never_reach_upstream() {
        // A dispatched request would be a 502; these stop at 404 first.
        for path in ["/api/../oauth2/authorize", "/api/%2e%2e/oauth2/authorize"] {
            let response = app(config(false, &[], &[]), [8, 8, 8, 8])
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
        }
    }

    #[tokio::test]
    async fn test_bearer_auth_runs_before_policy() {
        let response = app(config(true, &[], &["key"]), [8, 8, 8, 8])
            .oneshot(Request::get("/api/x").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app(config(true, &[], &["key"]), [8, 8, 8, 8])
            .oneshot(
                Request::get("/api/x")
                    .header(header::AUTHORIZATION, "Bearer key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_responses_carry_security_headers_and_request_id() {
        let response = app(config(false, &[], &[]), [8, 8, 8, 8])
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.headers().get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
        assert_eq!(response.headers().get(header::X_FRAME_OPTIONS).unwrap(), "SAMEORIGIN");
        assert!(response.headers().contains_key(X_REQUEST_ID));
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let response = app(config(false, &[], &[]), [8, 8, 8, 8])
            .oneshot(Request::get("/other").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "Not Found");
    }
}
