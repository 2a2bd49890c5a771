//! Chain-level types and error definitions.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

// Re-export ChainConfig from config module to avoid duplication
pub use crate::config::schema::ChainConfig;

/// Network the relay operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    /// Identifier sent to the protocol builder.
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
        }
    }

    /// Path segment used by the chain gateway REST API.
    pub fn gateway_path(&self) -> &'static str {
        match self {
            Network::Mainnet => "main",
            Network::Testnet => "test",
        }
    }

    /// Address/WIF encoding parameters. Legacy P2PKH version bytes are shared with Bitcoin.
    pub fn bitcoin_network(&self) -> bitcoin::Network {
        match self {
            Network::Mainnet => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unspent output as reported by the chain gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainUnspent {
    pub tx_id: String,
    pub output_index: u32,
    pub satoshis: u64,
}

/// A fee wallet output tracked by the pool.
///
/// `eligible_after_ms` gates selection in time (unix millis, 0 = always
/// eligible). `backoff_count` records how many times the network rejected a
/// spend of this output for ancestor-chain depth; higher counts sort later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Utxo {
    pub tx_id: String,
    pub output_index: u32,
    pub satoshis: u64,
    #[serde(default)]
    pub eligible_after_ms: u64,
    #[serde(default)]
    pub backoff_count: u32,
}

impl Utxo {
    /// A freshly observed output with no gate and no back-off.
    pub fn new(tx_id: impl Into<String>, output_index: u32, satoshis: u64) -> Self {
        Self {
            tx_id: tx_id.into(),
            output_index,
            satoshis,
            eligible_after_ms: 0,
            backoff_count: 0,
        }
    }

    /// Whether this output refers to the same outpoint as `(tx_id, output_index)`.
    pub fn is_outpoint(&self, tx_id: &str, output_index: u32) -> bool {
        self.tx_id == tx_id && self.output_index == output_index
    }

    pub fn is_eligible(&self, now_ms: u64) -> bool {
        self.eligible_after_ms <= now_ms
    }
}

impl From<ChainUnspent> for Utxo {
    fn from(u: ChainUnspent) -> Self {
        Utxo::new(u.tx_id, u.output_index, u.satoshis)
    }
}

/// Errors surfaced by the chain gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport failure or unexpected response from every provider.
    #[error("Gateway error: {0}")]
    Rpc(String),

    /// Request timed out.
    #[error("Gateway timeout after {0} seconds")]
    Timeout(u64),

    /// Broadcast rejected because the unconfirmed ancestor chain is too long.
    #[error("Broadcast rejected: too-long-mempool-chain")]
    TooLongMempoolChain,

    /// Broadcast rejected by node policy for any other reason.
    #[error("Broadcast rejected: {0}")]
    Rejected(String),

    /// Requested transaction is unknown to the gateway.
    #[error("Transaction not found: {0}")]
    NotFound(String),
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Current wall-clock time in unix milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
