//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (JSON or TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → AccessConfig + layer state, shared via Arc
//! ```
//!
//! # Design Decisions
//! - Loaded once at startup; any error aborts the process
//! - Access fields are mandatory, everything else has defaults
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{GatewayConfig, ObservabilityConfig, RateLimitConfig, UnderPressureConfig};
