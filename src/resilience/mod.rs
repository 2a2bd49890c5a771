//! Resilience helpers.
//!
//! Only failures the relay classifies as retryable (exhausted fee pool,
//! unconfirmed chain depth, pending merge, unreachable collaborators) are
//! worth retrying; the delay between attempts grows exponentially with
//! jitter so concurrent clients do not retry in lockstep.

pub mod backoff;

pub use backoff::{calculate_backoff, RetryPolicy};
