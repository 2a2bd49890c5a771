//! Token transaction orchestration.
//!
//! # Data Flow
//! ```text
//! HTTP handler
//!     → TokenOrchestrator (explicit context: wallets, builder, gateway, stores)
//!     → wallet_for(payer) → FeeWallet.try_use_utxos(fee estimate)
//!         → ProtocolBuilder (unsigned template)
//!         → sign_template (fee key + operation key)
//!         → ChainGateway.broadcast
//!     → IssuerStore / TokenUtxoStore updates, change credited to the wallet
//! ```
//!
//! # Responsibilities
//! - genesis, issue, transfer and merge flows
//! - Route-check shape selection and fee estimation
//! - Token balance and issuer queries

pub mod fees;
pub mod orchestrator;
pub mod route;
pub mod transfer;
pub mod types;

pub use fees::FeeSchedule;
pub use orchestrator::TokenOrchestrator;
pub use route::RouteCheckShape;
pub use types::{IssuerRecord, TokenAmount, TokenReceiver, TokenUtxo};
