//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, global layers, /api pre-request layers)
//!     → request.rs (request ID)
//!     → access policy → Decision
//!     → dispatch.rs (403 on Deny, forward upstream on Allow)
//!     → response.rs (JSON errors, security headers, hop-by-hop stripping)
//!     → Send to client
//! ```

pub mod dispatch;
pub mod request;
pub mod response;
pub mod server;

pub use dispatch::Upstream;
pub use request::X_REQUEST_ID;
pub use server::{HttpServer, ServerError};
