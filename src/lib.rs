//! Fungible token relay library.

pub mod builder;
pub mod chain;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod store;
pub mod token;
pub mod wallet;

pub use config::schema::RelayConfig;
pub use error::{RelayError, RelayResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use token::TokenOrchestrator;
pub use wallet::FeeWallet;
