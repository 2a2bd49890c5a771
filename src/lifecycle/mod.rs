//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Load wallet keys → Sync wallets → Build orchestrator
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Stop accepting → Drain requests → Save snapshot → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then wallets, then listeners
//! - Ordered shutdown: stop accept, drain, persist

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{build_orchestrator, Services};
