//! Outbound header sanitizing.
//!
//! Runs on allowed requests right before they are forwarded. The upstream
//! sees a fixed `User-Agent` naming this gateway and never sees the identity
//! header the access policy consumed.

use axum::http::header::{InvalidHeaderValue, USER_AGENT};
use axum::http::{HeaderMap, HeaderValue};

use crate::security::access_control::IDENTITY_HEADER;

/// Version embedded in the outbound `User-Agent`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Canonical project reference, used for the `User-Agent` and the `/` redirect.
pub const PROJECT_URL: &str = env!("CARGO_PKG_REPOSITORY");

/// `User-Agent` value announced to the upstream.
pub fn user_agent(version: &str, project_url: &str) -> String {
    format!("DiscordProxy/{version} ({project_url})")
}

/// Rewrites upstream-bound headers.
#[derive(Debug, Clone)]
pub struct HeaderSanitizer {
    user_agent: HeaderValue,
}

impl HeaderSanitizer {
    pub fn new(version: &str, project_url: &str) -> Result<Self, InvalidHeaderValue> {
        Ok(Self {
            user_agent: HeaderValue::from_str(&user_agent(version, project_url))?,
        })
    }

    /// Sanitizer for the running package.
    pub fn for_package() -> Result<Self, InvalidHeaderValue> {
        Self::new(VERSION, PROJECT_URL)
    }

    pub fn user_agent(&self) -> &HeaderValue {
        &self.user_agent
    }

    /// Overwrite `User-Agent` and drop every identity header value.
    pub fn rewrite(&self, headers: &mut HeaderMap) {
        headers.insert(USER_AGENT, self.user_agent.clone());
        headers.remove(IDENTITY_HEADER);
    }
}
