//! Request dispatch.
//!
//! Turns an access [`Decision`] into a response: denials become a JSON 403
//! without touching the network, allowed requests are sent to the upstream
//! and its response is relayed back as-is.
//!
//! Dropping the future returned by [`forward`] (the client went away) drops
//! the in-flight upstream request with it. Failed upstream calls are never
//! retried.

use axum::{
    body::Body,
    http::{header, request::Parts, Request, StatusCode},
    response::Response,
};
use thiserror::Error;
use url::Url;

use crate::http::response::{json_error, strip_hop_by_hop};
use crate::observability::metrics;
use crate::security::{Decision, HeaderSanitizer};

/// Body of policy rejections.
pub const DENY_MESSAGE: &str = "You are not allowed to use this proxy.";

/// Inbound prefix handled by the dispatcher.
pub const API_PREFIX: &str = "/api";

/// Prefix the inbound one is rewritten to on the upstream.
pub const UPSTREAM_PREFIX: &str = "/api";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("path `{0}` is outside the proxied prefix")]
    OutsidePrefix(String),

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

impl DispatchError {
    fn status(&self) -> StatusCode {
        match self {
            DispatchError::OutsidePrefix(_) => StatusCode::NOT_FOUND,
            DispatchError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            DispatchError::Upstream(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            DispatchError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// The fixed upstream and everything needed to talk to it.
#[derive(Debug, Clone)]
pub struct Upstream {
    client: reqwest::Client,
    origin: Url,
    sanitizer: HeaderSanitizer,
    max_body_bytes: usize,
}

impl Upstream {
    pub fn new(
        client: reqwest::Client,
        origin: Url,
        sanitizer: HeaderSanitizer,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            client,
            origin,
            sanitizer,
            max_body_bytes,
        }
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Upstream URL for an inbound path and query.
    pub fn target_url(&self, path: &str, query: Option<&str>) -> Result<Url, DispatchError> {
        let rest = path
            .strip_prefix(API_PREFIX)
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
            .ok_or_else(|| DispatchError::OutsidePrefix(path.to_string()))?;

        // `set_path` resolves `.` and `..`, which could climb out of the prefix.
        if rest.split(|c| c == '/' || c == '\\').any(is_dot_segment) {
            return Err(DispatchError::OutsidePrefix(path.to_string()));
        }

        let mut url = self.origin.clone();
        url.set_path(&format!("{UPSTREAM_PREFIX}{rest}"));
        url.set_query(query);

        let target = url.path();
        if target != UPSTREAM_PREFIX && !target.starts_with(&format!("{UPSTREAM_PREFIX}/")) {
            return Err(DispatchError::OutsidePrefix(path.to_string()));
        }
        Ok(url)
    }

    /// Send an allowed request upstream and relay the response.
    pub async fn send(&self, request: Request<Body>) -> Result<Response, DispatchError> {
        let (parts, body) = request.into_parts();
        let Parts {
            method,
            uri,
            mut headers,
            ..
        } = parts;

        let url = self.target_url(uri.path(), uri.query())?;

        let body = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|_| DispatchError::BodyTooLarge {
                limit: self.max_body_bytes,
            })?;

        strip_hop_by_hop(&mut headers);
        // Derived by the client from the target URL and body.
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);
        self.sanitizer.rewrite(&mut headers);

        let mut outbound = self.client.request(method, url).headers(headers);
        if !body.is_empty() {
            outbound = outbound.body(body);
        }
        let upstream = outbound.send().await?;

        let status = upstream.status();
        let mut response_headers = upstream.headers().clone();
        strip_hop_by_hop(&mut response_headers);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}

/// `.` or `..`, raw or percent-encoded.
fn is_dot_segment(segment: &str) -> bool {
    let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
    decoded == "." || decoded == ".."
}

/// Response sent for a denied request.
pub fn deny_response(status: StatusCode) -> Response {
    json_error(status, DENY_MESSAGE)
}

/// Act on the access decision for one request.
pub async fn forward(upstream: &Upstream, request: Request<Body>, decision: Decision) -> Response {
    match decision {
        Decision::Deny { status, reason } => {
            metrics::record_denied(reason.as_str());
            deny_response(status)
        }
        Decision::Allow => match upstream.send(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "Upstream dispatch failed");
                json_error(e.status(), &e.to_string())
            }
        },
    }
}
