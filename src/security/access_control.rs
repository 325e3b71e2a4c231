//! Access policy for `/api` traffic.
//!
//! `decide` is a pure function over the caller's address and headers. It
//! returns a [`Decision`] and leaves it to the HTTP layer to either reject the
//! request or hand it to the dispatcher.
//!
//! Evaluation order, first match wins:
//! 1. restricted mode off → allow
//! 2. loopback / IPv4-mapped source → allow
//! 3. identity list configured and header missing or unknown → deny
//! 4. source outside every datacenter range → deny
//! 5. allow
//!
//! Steps 3 and 4 are independent gates. A known identity does not skip the
//! range check.

use std::collections::HashSet;
use std::fmt;

use axum::http::{HeaderMap, StatusCode};

use crate::config::GatewayConfig;
use crate::security::ranges::RangeTable;

/// Header carrying the caller's declared place ID.
pub const IDENTITY_HEADER: &str = "roblox-id";

/// Source addresses that are always admitted.
pub const LOOPBACK_ADDRESSES: [&str; 3] = ["localhost", "::1", "127.0.0.1"];

/// Prefix of IPv4-mapped IPv6 addresses, also always admitted.
pub const IPV4_MAPPED_PREFIX: &str = "::ffff:";

/// Access settings derived from the startup document.
#[derive(Debug, Clone, Default)]
pub struct AccessConfig {
    pub restricted_mode: bool,
    pub allowed_identities: HashSet<String>,
    pub caller_tokens: HashSet<String>,
}

impl From<&GatewayConfig> for AccessConfig {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            restricted_mode: config.only_roblox_server,
            allowed_identities: config.place_ids.iter().cloned().collect(),
            caller_tokens: config.api_keys.iter().cloned().collect(),
        }
    }
}

/// The parts of an inbound request the policy looks at.
#[derive(Debug, Clone, Copy)]
pub struct ClientRequest<'a> {
    pub source_address: &'a str,
    pub headers: &'a HeaderMap,
}

impl<'a> ClientRequest<'a> {
    pub fn new(source_address: &'a str, headers: &'a HeaderMap) -> Self {
        Self {
            source_address,
            headers,
        }
    }

    /// Value of the identity header, if present and valid UTF-8.
    pub fn identity(&self) -> Option<&'a str> {
        self.headers
            .get(IDENTITY_HEADER)
            .and_then(|value| value.to_str().ok())
    }
}

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    IdentityRejected,
    AddressRejected,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::IdentityRejected => "identity rejected",
            DenyReason::AddressRejected => "address rejected",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating the policy for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { status: StatusCode, reason: DenyReason },
}

impl Decision {
    fn deny(reason: DenyReason) -> Self {
        Decision::Deny {
            status: StatusCode::FORBIDDEN,
            reason,
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Whether the source address is covered by the local-machine bypass.
pub fn is_loopback(source_address: &str) -> bool {
    LOOPBACK_ADDRESSES.contains(&source_address) || source_address.starts_with(IPV4_MAPPED_PREFIX)
}

/// Evaluate the access policy for one request.
pub fn decide(req: &ClientRequest<'_>, cfg: &AccessConfig, ranges: &RangeTable) -> Decision {
    if !cfg.restricted_mode {
        return Decision::Allow;
    }

    if is_loopback(req.source_address) {
        return Decision::Allow;
    }

    if !cfg.allowed_identities.is_empty() {
        match req.identity() {
            Some(id) if cfg.allowed_identities.contains(id) => {}
            _ => return Decision::deny(DenyReason::IdentityRejected),
        }
    }

    if !ranges.contains(req.source_address) {
        return Decision::deny(DenyReason::AddressRejected);
    }

    Decision::Allow
}

/// Access configuration bundled with the range table it is checked against.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    config: AccessConfig,
    ranges: RangeTable,
}

impl AccessPolicy {
    pub fn new(config: AccessConfig, ranges: RangeTable) -> Self {
        Self { config, ranges }
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    pub fn decide(&self, req: &ClientRequest<'_>) -> Decision {
        decide(req, &self.config, &self.ranges)
    }
}
