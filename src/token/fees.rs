//! Fee estimates for token operations.
//!
//! Every token transaction carries large contract scripts, so the fee is
//! dominated by their byte sizes. Each estimate is the relay fee for the
//! script bytes plus a fee-wallet input and change output, plus the dust
//! value locked into every contract output the transaction creates.

use crate::chain::transaction::{estimate_p2pkh_size, fee_for_size};
use crate::config::schema::FeeConfig;
use crate::token::route::RouteCheckShape;

/// Relay fee rate (sat/kB) used by the node's dust rule.
const DUST_RELAY_FEE_PER_KB: u64 = 250;
/// Serialized outpoint, value and length prefix added to a script when spent.
const DUST_SPEND_OVERHEAD: u64 = 9 + 148;

/// Smallest value an output with a `script_size`-byte locking script may carry.
pub fn dust_threshold(script_size: usize) -> u64 {
    let bytes = script_size as u64 + DUST_SPEND_OVERHEAD;
    (DUST_RELAY_FEE_PER_KB * bytes).div_ceil(1000) * 3
}

/// Fee estimates derived from the configured script sizes.
#[derive(Debug, Clone)]
pub struct FeeSchedule {
    config: FeeConfig,
}

impl FeeSchedule {
    pub fn new(config: FeeConfig) -> Self {
        Self { config }
    }

    pub fn fee_rate(&self) -> f64 {
        self.config.fee_rate
    }

    fn with_fee_input(&self, script_bytes: usize) -> u64 {
        fee_for_size(script_bytes + estimate_p2pkh_size(1, 1), self.config.fee_rate)
    }

    /// Fixed budget reserved for a genesis transaction.
    pub fn genesis(&self) -> u64 {
        self.config.genesis_budget
    }

    /// Spend of the issuance contract creating a new contract output and one token output.
    pub fn issue(&self) -> u64 {
        let c = &self.config;
        let bytes = c.genesis_script_size * 2 + c.issue_unlock_size + c.token_script_size;
        self.with_fee_input(bytes)
            + dust_threshold(c.genesis_script_size)
            + dust_threshold(c.token_script_size)
    }

    /// Phase 1 of a transfer: the route-check transaction for `shape`.
    pub fn route_check(&self, shape: RouteCheckShape) -> u64 {
        let size = self.config.route_check.for_shape(shape);
        self.with_fee_input(size) + dust_threshold(size)
    }

    /// Phase 2 of a transfer: spends `inputs` token outputs and the
    /// route-check output, creating `outputs` token outputs.
    pub fn transfer(&self, shape: RouteCheckShape, inputs: usize, outputs: usize) -> u64 {
        let c = &self.config;
        let bytes = c.route_check.for_shape(shape)
            + c.route_check_unlock_size
            + inputs * (c.token_unlock_size + c.token_script_size)
            + outputs * c.token_script_size;
        self.with_fee_input(bytes) + outputs as u64 * dust_threshold(c.token_script_size)
    }
}
