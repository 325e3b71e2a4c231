//! Load shedding.
//!
//! Caps the number of `/api` requests in flight. Once the cap is reached new
//! requests are answered immediately with 503 and a `Retry-After` hint instead
//! of queueing behind the upstream.
//!
//! A request counts as in flight until its response headers are ready. The
//! permit is released before a streamed upstream body is sent to the client,
//! so slow downloads do not count against the cap.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tokio::sync::Semaphore;

use crate::config::UnderPressureConfig;
use crate::http::response::json_error;
use crate::observability::metrics;

pub const UNDER_PRESSURE_MESSAGE: &str = "Under pressure!";

pub struct LoadShedState {
    permits: Arc<Semaphore>,
    enabled: bool,
    retry_after_secs: u64,
}

impl LoadShedState {
    pub fn new(config: &UnderPressureConfig) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.max_in_flight)),
            enabled: config.enabled,
            retry_after_secs: config.retry_after_secs,
        }
    }

    /// Requests that can still be admitted right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

pub async fn load_shed_middleware(
    State(state): State<Arc<LoadShedState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.enabled {
        return next.run(request).await;
    }

    // Released once the response headers are ready, not when the body ends.
    let Ok(_permit) = state.permits.clone().try_acquire_owned() else {
        tracing::warn!(path = %request.uri().path(), "Shedding load, too many requests in flight");
        metrics::record_load_shed();
        let mut response = json_error(StatusCode::SERVICE_UNAVAILABLE, UNDER_PRESSURE_MESSAGE);
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(state.retry_after_secs));
        return response;
    };

    next.run(request).await
}
