//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::chain::types::Network;
use crate::token::route::RouteCheckShape;

/// Root configuration for the token relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,

    /// Ledger network every wallet and address belongs to.
    pub network: Network,

    /// Chain gateway endpoints.
    pub chain: ChainConfig,

    /// Protocol builder endpoint.
    pub builder: BuilderConfig,

    /// Fee rate and script size constants.
    pub fees: FeeConfig,

    /// Fee wallet pool tuning.
    pub pool: PoolConfig,

    /// Fee wallets; keys come from the named environment variables.
    pub wallets: Vec<WalletConfig>,

    /// Persistence settings.
    pub store: StoreConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl RelayConfig {
    /// The wallet marked `default`, or the first one configured.
    pub fn default_wallet(&self) -> Option<&WalletConfig> {
        self.wallets
            .iter()
            .find(|w| w.default)
            .or_else(|| self.wallets.first())
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Per-request timeout in seconds. Transfers make several external calls.
    pub request_timeout_secs: u64,

    /// Maximum accepted request body in bytes.
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            request_timeout_secs: 120,
            max_body_size: 1024 * 1024,
        }
    }
}

/// Chain gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Primary REST endpoint, without the network segment.
    pub base_url: String,

    /// Endpoints tried in order when the primary fails.
    pub failover_urls: Vec<String>,

    /// Timeout per gateway call in seconds.
    pub timeout_secs: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.whatsonchain.com/v1/bsv".to_string(),
            failover_urls: Vec::new(),
            timeout_secs: 10,
        }
    }
}

/// Protocol builder configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// URL prefix; routes such as `/genesis` are appended.
    pub url_prefix: String,

    /// Timeout per builder call in seconds.
    pub timeout_secs: u64,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            url_prefix: "http://127.0.0.1:8091/api".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Byte sizes of the route-check verification scripts, one per shape.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouteCheckSizes {
    #[serde(rename = "3To3")]
    pub three_to_three: usize,
    #[serde(rename = "6To6")]
    pub six_to_six: usize,
    #[serde(rename = "10To10")]
    pub ten_to_ten: usize,
    #[serde(rename = "3To100")]
    pub three_to_hundred: usize,
    #[serde(rename = "20To3")]
    pub twenty_to_three: usize,
}

impl RouteCheckSizes {
    pub fn for_shape(&self, shape: RouteCheckShape) -> usize {
        match shape {
            RouteCheckShape::ThreeToThree => self.three_to_three,
            RouteCheckShape::SixToSix => self.six_to_six,
            RouteCheckShape::TenToTen => self.ten_to_ten,
            RouteCheckShape::ThreeToHundred => self.three_to_hundred,
            RouteCheckShape::TwentyToThree => self.twenty_to_three,
        }
    }
}

impl Default for RouteCheckSizes {
    fn default() -> Self {
        Self {
            three_to_three: 6_362,
            six_to_six: 10_499,
            ten_to_ten: 16_015,
            three_to_hundred: 52_244,
            twenty_to_three: 12_645,
        }
    }
}

/// Fee rate and protocol script sizes used for fee estimation.
///
/// Script sizes depend on the token protocol version and must track the
/// builder deployment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeeConfig {
    /// Satoshis per byte.
    pub fee_rate: f64,

    /// Fixed satoshi budget reserved for a genesis transaction.
    pub genesis_budget: u64,

    /// Issuance contract locking script.
    pub genesis_script_size: usize,

    /// Unlocking data of an issue spend.
    pub issue_unlock_size: usize,

    /// Token output locking script.
    pub token_script_size: usize,

    /// Unlocking data per token input of a transfer.
    pub token_unlock_size: usize,

    /// Unlocking data of the route-check input of a transfer.
    pub route_check_unlock_size: usize,

    /// Route-check script size per shape.
    pub route_check: RouteCheckSizes,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            fee_rate: 0.5,
            genesis_budget: 20_000,
            genesis_script_size: 4_081,
            issue_unlock_size: 6_120,
            token_script_size: 4_838,
            token_unlock_size: 9_530,
            route_check_unlock_size: 3_400,
            route_check: RouteCheckSizes::default(),
        }
    }
}

/// Fee wallet pool tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Auto-split runs only while the pool holds fewer outputs than this.
    pub low_water_mark: usize,

    /// Most unit outputs one split transaction creates.
    pub max_split_outputs: usize,

    /// Most outputs examined by one reservation.
    pub max_selection_attempts: usize,

    /// Outputs at or below this value are never selected.
    pub dust_satoshis: u64,

    /// Balance below which sync logs a funding warning.
    pub lowest_balance: u64,

    /// Cooldown per back-off step after a chain-depth rejection.
    pub backoff_cooldown_ms: u64,

    /// Delay before freshly credited change becomes eligible.
    pub change_settle_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            low_water_mark: 30,
            max_split_outputs: 500,
            max_selection_attempts: 50,
            dust_satoshis: 546,
            lowest_balance: 10_000,
            backoff_cooldown_ms: 600_000,
            change_settle_ms: 0,
        }
    }
}

/// One fee wallet.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WalletConfig {
    /// Environment variable holding the WIF private key.
    pub key_env: String,

    /// Target value of each auto-split output.
    #[serde(default = "default_unit_satoshis")]
    pub unit_satoshis: u64,

    /// Used for payers without a wallet of their own.
    #[serde(default)]
    pub default: bool,
}

fn default_unit_satoshis() -> u64 {
    20_000
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON snapshot loaded at startup and written at shutdown. In-memory only when unset.
    pub snapshot_path: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
