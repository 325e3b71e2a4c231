//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     .env → CLI args → load config (fatal on error) → logging → metrics → bind → serve
//!
//! Shutdown:
//!     signals.rs (SIGTERM/SIGINT) → shutdown.rs broadcast
//!     → server stops accepting, drains in-flight requests
//!     → background tasks exit
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
