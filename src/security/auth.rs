//! Bearer token authentication for `/api` routes.
//!
//! Only active when at least one API key is configured. Runs before the access
//! policy so unauthenticated callers never reach it.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use constant_time_eq::constant_time_eq;

use crate::http::response::json_error;

/// Accepted bearer tokens.
#[derive(Debug, Clone, Default)]
pub struct BearerAuth {
    tokens: HashSet<String>,
}

impl BearerAuth {
    pub fn new(tokens: HashSet<String>) -> Self {
        Self { tokens }
    }

    pub fn is_enabled(&self) -> bool {
        !self.tokens.is_empty()
    }

    /// Check an `Authorization` header value of the form `Bearer <token>`.
    pub fn verify(&self, authorization: Option<&str>) -> bool {
        let Some(token) = authorization.and_then(bearer_token) else {
            return false;
        };

        // Compare against every key so timing does not reveal which one matched.
        self.tokens
            .iter()
            .fold(false, |found, key| constant_time_eq(key.as_bytes(), token.as_bytes()) | found)
    }
}

fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

pub async fn bearer_auth_middleware(
    State(auth): State<Arc<BearerAuth>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !auth.is_enabled() {
        return next.run(request).await;
    }

    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if auth.verify(authorization) {
        return next.run(request).await;
    }

    tracing::debug!(path = %request.uri().path(), "Rejected request without valid bearer token");
    let mut response = json_error(StatusCode::UNAUTHORIZED, "Unauthorized");
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    response
}
