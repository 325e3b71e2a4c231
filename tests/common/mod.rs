//! Shared utilities for integration tests.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Bytes,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use discord_proxy::config::GatewayConfig;
use discord_proxy::http::HttpServer;
use discord_proxy::lifecycle::Shutdown;
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// Echo every request back as JSON so tests can see what reached the upstream.
async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let headers: BTreeMap<String, String> = headers
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect();

    Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query(),
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    }))
}

async fn missing() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        [("x-upstream", "yes")],
        Json(json!({ "message": "Unknown Channel", "code": 10003 })),
    )
}

/// Answers after the gateway's shortest allowed timeout has passed.
async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(3)).await;
    "too late"
}

/// Start a mock upstream on an ephemeral port.
pub async fn start_mock_upstream() -> SocketAddr {
    let app = Router::new()
        .route("/api/v10/channels/missing", get(missing))
        .route("/api/v10/slow", get(slow))
        .fallback(echo);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Gateway config pointing at `upstream`.
pub fn gateway_config(upstream: SocketAddr) -> GatewayConfig {
    GatewayConfig {
        upstream: format!("http://{upstream}"),
        ..GatewayConfig::default()
    }
}

/// Start the gateway on an ephemeral port. Trigger the returned handle to stop it.
pub async fn start_gateway(config: GatewayConfig) -> (SocketAddr, Shutdown) {
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, shutdown)
}

/// Client that does not follow redirects or pool connections.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
