//! Configuration schema definitions.
//!
//! The startup document uses camelCase keys. The three access-control fields
//! (`onlyRobloxServer`, `placeIds`, `apiKeys`) are required; every other
//! section falls back to its default.

use serde::{Deserialize, Serialize};

/// Default upstream origin all allowed requests are forwarded to.
pub const DEFAULT_UPSTREAM: &str = "https://discord.com";

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Restrict `/api` traffic to the built-in datacenter ranges and place IDs.
    pub only_roblox_server: bool,

    /// Accepted values of the `roblox-id` header. Empty disables the check.
    pub place_ids: Vec<String>,

    /// Accepted bearer tokens. Empty disables bearer authentication.
    pub api_keys: Vec<String>,

    /// Upstream origin (scheme, host and optional port).
    #[serde(default = "default_upstream")]
    pub upstream: String,

    /// Total time allowed for one request/response exchange, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Largest request body buffered for forwarding, in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub under_pressure: UnderPressureConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

fn default_upstream() -> String {
    DEFAULT_UPSTREAM.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    25 * 1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            only_roblox_server: false,
            place_ids: Vec::new(),
            api_keys: Vec::new(),
            upstream: default_upstream(),
            request_timeout_secs: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
            rate_limit: RateLimitConfig::default(),
            under_pressure: UnderPressureConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Per-client fixed window rate limiting.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitConfig {
    pub enabled: bool,

    /// Requests allowed per client within one window.
    pub max: u32,

    /// Window length in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max: 100,
            window_secs: 60,
        }
    }
}

/// Load shedding once too many requests are in flight.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UnderPressureConfig {
    pub enabled: bool,

    /// Concurrent requests admitted before shedding starts.
    pub max_in_flight: usize,

    /// Value of the `Retry-After` header on shed responses.
    pub retry_after_secs: u64,
}

impl Default for UnderPressureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_in_flight: 1024,
            retry_after_secs: 50,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
