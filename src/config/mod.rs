//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, path from --config)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RelayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Private keys never appear in the file, only the variables holding them

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BuilderConfig, ChainConfig, FeeConfig, PoolConfig, RelayConfig, ServerConfig, WalletConfig,
};
pub use validation::{validate_config, ValidationError};
