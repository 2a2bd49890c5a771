//! Fee wallet subsystem.
//!
//! # Data Flow
//! ```text
//! startup: UtxoStore + ChainGateway.get_unspents → sync → UtxoPool
//!
//! per operation:
//!     try_use_utxos(estimate)
//!         → pool.reserve (atomic select + remove)
//!         → operation(reserved)
//!         → success: store.remove | chain-depth: back off + recycle | other: recycle
//!         → spawn adjust (auto-split when the pool runs low)
//! ```
//!
//! # Design Decisions
//! - An output is either in the pool or in exactly one reservation
//! - Temporal gating (`eligible_after_ms`) and chain-depth back-off
//!   (`backoff_count`) are separate fields with separate rules
//! - At most one split per wallet is in flight

pub mod fee_wallet;
pub mod pool;

pub use fee_wallet::{FeeWallet, SplitOutcome, WalletStatus};
pub use pool::{SelectionLimits, SplitSkip, UtxoPool};
