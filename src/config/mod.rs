//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, warnings vs. fatal errors)
//!     → ClientConfig (validated, immutable)
//!     → handed to ClientFactory, which owns it for its lifetime
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a new factory is built to change it
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::BackendKind;
pub use schema::ClientConfig;
pub use schema::ObservabilityConfig;
pub use schema::PoolConfig;
pub use schema::StoreType;
pub use schema::TlsVersion;
pub use schema::TrustConfig;
pub use validation::{validate_config, Severity, ValidationError};
