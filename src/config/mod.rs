//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → settings.rs (runtime view, shared via Arc by every connection)
//! ```
//!
//! # Design Decisions
//! - All fields have defaults so an empty file is a valid config
//! - Validation separates syntactic (serde) from semantic checks
//! - TLS material is loaded by the server, not here

pub mod loader;
pub mod schema;
pub mod settings;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    HttpConfig, ListenerConfig, ObservabilityConfig, ProtocolConfig, ServerConfig, TimeoutConfig,
    TlsConfig,
};
pub use settings::Settings;
pub use validation::{validate_config, ValidationError};
