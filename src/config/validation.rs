//! Configuration validation.
//!
//! Serde covers the syntax; this pass checks values. Every problem is
//! reported, not just the first one.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::sync::Semaphore;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("upstream `{0}` is not an absolute http(s) URL")]
    InvalidUpstream(String),

    #[error("upstream `{0}` must be an origin without a path, query or fragment")]
    UpstreamNotOrigin(String),

    #[error("placeIds[{0}] is empty")]
    EmptyPlaceId(usize),

    #[error("apiKeys[{0}] is empty")]
    EmptyApiKey(usize),

    #[error("requestTimeoutSecs must be greater than zero")]
    ZeroRequestTimeout,

    #[error("maxBodyBytes must be greater than zero")]
    ZeroBodyLimit,

    #[error("rateLimit.max must be greater than zero")]
    ZeroRateLimit,

    #[error("rateLimit.windowSecs must be greater than zero")]
    ZeroRateWindow,

    #[error("underPressure.maxInFlight must be greater than zero")]
    ZeroMaxInFlight,

    #[error("underPressure.maxInFlight must be at most {max}")]
    MaxInFlightTooLarge { max: usize },

    #[error("observability.metricsAddress `{0}` is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = validate_upstream(&config.upstream) {
        errors.push(e);
    }

    errors.extend(
        config
            .place_ids
            .iter()
            .enumerate()
            .filter(|(_, id)| id.trim().is_empty())
            .map(|(i, _)| ValidationError::EmptyPlaceId(i)),
    );
    errors.extend(
        config
            .api_keys
            .iter()
            .enumerate()
            .filter(|(_, key)| key.trim().is_empty())
            .map(|(i, _)| ValidationError::EmptyApiKey(i)),
    );

    if config.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }
    if config.max_body_bytes == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }
    if config.rate_limit.enabled {
        if config.rate_limit.max == 0 {
            errors.push(ValidationError::ZeroRateLimit);
        }
        if config.rate_limit.window_secs == 0 {
            errors.push(ValidationError::ZeroRateWindow);
        }
    }
    if config.under_pressure.enabled {
        if config.under_pressure.max_in_flight == 0 {
            errors.push(ValidationError::ZeroMaxInFlight);
        }
        if config.under_pressure.max_in_flight > Semaphore::MAX_PERMITS {
            errors.push(ValidationError::MaxInFlightTooLarge {
                max: Semaphore::MAX_PERMITS,
            });
        }
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_upstream(upstream: &str) -> Result<Url, ValidationError> {
    let url = Url::parse(upstream).map_err(|_| ValidationError::InvalidUpstream(upstream.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ValidationError::InvalidUpstream(upstream.to_string()));
    }
    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        return Err(ValidationError::UpstreamNotOrigin(upstream.to_string()));
    }

    Ok(url)
}
