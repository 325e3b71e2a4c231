//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming /api request:
//!     → auth.rs (bearer token, when keys are configured)
//!     → load_shed.rs (cap requests in flight)
//!     → rate_limit.rs (per-IP fixed window)
//!     → access_control.rs (restricted mode policy → Decision)
//!     → headers.rs (sanitize outbound headers on Allow)
//!     → Pass to dispatcher
//! ```
//!
//! # Design Decisions
//! - Fail closed: unparsable source addresses are outside every range
//! - Policy is a pure function; only the HTTP layer turns it into a response
//! - Range table and access settings are immutable after startup

pub mod access_control;
pub mod auth;
pub mod headers;
pub mod load_shed;
pub mod ranges;
pub mod rate_limit;

pub use access_control::{AccessConfig, AccessPolicy, ClientRequest, Decision, DenyReason};
pub use headers::HeaderSanitizer;
pub use ranges::{AddressRange, RangeTable};
