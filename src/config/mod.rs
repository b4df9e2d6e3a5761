//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults or config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → environment overrides (PORT, LIVEKIT_URL, ...)
//!     → validation.rs (semantic checks)
//!     → BridgeConfig (validated, immutable)
//!     → shared via Arc with the bridge service
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::BridgeConfig;
pub use schema::LiveKitConfig;
pub use schema::LogFormat;
pub use schema::ObservabilityConfig;
pub use schema::ServerConfig;
