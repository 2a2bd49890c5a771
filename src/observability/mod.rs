//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms via the metrics facade)
//!
//! Consumers:
//!     → stdout (fmt layer, level from config or RUST_LOG)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every HTTP span
//! - Metrics are cheap (atomic increments) and no-ops without a recorder
//! - Keys and WIFs never appear in log fields

pub mod logging;
pub mod metrics;
