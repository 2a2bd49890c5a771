//! Persistence subsystem.
//!
//! # Data Flow
//! ```text
//! FeeWallet        → UtxoStore       (fee outputs per wallet address)
//! TokenOrchestrator → IssuerStore     (issuance contract state per token)
//!                  → TokenUtxoStore  (token outputs per holder and token)
//! ```
//!
//! # Design Decisions
//! - Narrow async traits so a database backend can replace the default
//! - `MemoryStore` implements all three over `DashMap`, with an optional
//!   JSON snapshot loaded at startup and written at shutdown
//! - Listing preserves insertion order; coin selection depends on it

pub mod memory;
pub mod traits;

pub use memory::MemoryStore;
pub use traits::{IssuerStore, StoreError, StoreResult, TokenUtxoStore, UtxoStore};
