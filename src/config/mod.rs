//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → handed by value to each subsystem constructor
//! ```
//!
//! All fields have defaults so a minimal file is enough to start.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AppConfig, ApprovalConfig, BlockchainConfig, DatabaseConfig, LogFormat, ObservabilityConfig,
    OutboxConfig, ScannerConfig, ServerConfig,
};
