//! Access-controlled gateway for the Discord HTTP API.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────┐
//!   GET /  ───────────────┼─▶ 302 → project page                         │
//!                         │                                              │
//!   * /api/** ────────────┼─▶ bearer auth ─▶ load shed ─▶ rate limit     │
//!                         │        │                                     │
//!                         │        ▼                                     │
//!                         │   access policy ──Deny──▶ 403 JSON           │
//!                         │        │ Allow                               │
//!                         │        ▼                                     │
//!                         │   header sanitizer ─▶ dispatch ──────────────┼──▶ upstream /api/**
//!                         │                          ◀───────────────────┼─── response (relayed)
//!                         └──────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
