//! Ledger integration subsystem.
//!
//! # Data Flow
//! ```text
//! Environment Variables (fee wallet WIF)
//!     → keys.rs (key loading, address derivation, digest signing)
//!     → gateway.rs (REST connection with timeouts and failover)
//!     → transaction.rs (template signing, split building, size estimates)
//! ```
//!
//! # Security Constraints
//! - Fee wallet keys ONLY from environment variables
//! - Never log private keys or sensitive data
//! - All gateway calls have configurable timeouts

pub mod gateway;
pub mod keys;
pub mod transaction;
pub mod types;

pub use gateway::{ChainGateway, HttpChainGateway};
pub use keys::{KeyError, SigningKey};
pub use transaction::{Prevout, SignedTx, TxError};
pub use types::{ChainConfig, ChainUnspent, GatewayError, GatewayResult, Network, Utxo};
