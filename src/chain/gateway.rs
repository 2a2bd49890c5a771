//! Chain gateway client with timeout and failover handling.
//!
//! # Responsibilities
//! - Query unspent outputs and raw transactions for the fee wallets
//! - Broadcast signed transactions
//! - Turn node policy rejections into structured errors
//! - Fail over between providers on transport errors (never on rejections)

use async_trait::async_trait;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

use crate::chain::types::{ChainConfig, ChainUnspent, GatewayError, GatewayResult, Network};

/// Marker the node embeds in ancestor-chain-depth rejections.
const TOO_LONG_MEMPOOL_CHAIN: &str = "too-long-mempool-chain";

/// Read and broadcast access to the ledger.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Unspent outputs currently paying `address`.
    async fn get_unspents(&self, address: &str) -> GatewayResult<Vec<ChainUnspent>>;

    /// Raw transaction hex for `txid`.
    async fn get_raw_tx(&self, txid: &str) -> GatewayResult<String>;

    /// Submit a signed transaction, returning its txid.
    async fn broadcast(&self, raw_hex: &str) -> GatewayResult<String>;
}

/// Unspent entry as returned by the REST API.
#[derive(Debug, Deserialize)]
struct RestUnspent {
    tx_hash: String,
    tx_pos: u32,
    value: u64,
}

/// REST gateway client with primary + failover providers.
#[derive(Clone)]
pub struct HttpChainGateway {
    client: reqwest::Client,
    /// Network-qualified base URLs, primary first.
    bases: Vec<String>,
    config: ChainConfig,
    network: Network,
    timeout_duration: Duration,
}

impl HttpChainGateway {
    /// Create a new gateway client.
    pub fn new(config: ChainConfig, network: Network) -> GatewayResult<Self> {
        let mut bases = Vec::new();

        let primary: url::Url = config.base_url.parse().map_err(|e| {
            GatewayError::Rpc(format!("Invalid gateway URL '{}': {}", config.base_url, e))
        })?;
        bases.push(Self::qualify(primary.as_str(), network));

        for url_str in &config.failover_urls {
            match url_str.parse::<url::Url>() {
                Ok(url) => bases.push(Self::qualify(url.as_str(), network)),
                Err(_) => tracing::warn!(url = %url_str, "Ignoring invalid failover gateway URL"),
            }
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| GatewayError::Rpc(e.to_string()))?;

        tracing::info!(
            base_url = %config.base_url,
            failovers = bases.len() - 1,
            network = %network,
            "Chain gateway initialized"
        );

        Ok(Self {
            client,
            bases,
            timeout_duration: Duration::from_secs(config.timeout_secs),
            config,
            network,
        })
    }

    fn qualify(base: &str, network: Network) -> String {
        format!("{}/{}", base.trim_end_matches('/'), network.gateway_path())
    }

    /// Run `call` against each provider in order until one gives a definitive answer.
    ///
    /// Transport errors and timeouts move on to the next provider; any other
    /// outcome (success, rejection, not-found) is returned as is. When every
    /// provider timed out the result is `Timeout`.
    async fn with_failover<T, F, Fut>(&self, op: &'static str, call: F) -> GatewayResult<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let mut all_timed_out = true;
        for (i, base) in self.bases.iter().enumerate() {
            match timeout(self.timeout_duration, call(base.clone())).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(GatewayError::Rpc(e))) => {
                    all_timed_out = false;
                    tracing::warn!(provider_idx = i, op, error = %e, "Gateway error, trying next provider");
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    tracing::warn!(provider_idx = i, op, "Gateway timeout, trying next provider");
                }
            }
        }
        if all_timed_out {
            return Err(GatewayError::Timeout(self.config.timeout_secs));
        }
        Err(GatewayError::Rpc(format!("All gateway providers failed: {}", op)))
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }
}

fn classify_rejection(body: &str) -> GatewayError {
    if body.contains(TOO_LONG_MEMPOOL_CHAIN) {
        GatewayError::TooLongMempoolChain
    } else {
        GatewayError::Rejected(body.trim().to_string())
    }
}

#[async_trait]
impl ChainGateway for HttpChainGateway {
    async fn get_unspents(&self, address: &str) -> GatewayResult<Vec<ChainUnspent>> {
        self.with_failover("get_unspents", |base| async move {
            let url = format!("{}/address/{}/unspent", base, address);
            let res = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| GatewayError::Rpc(e.to_string()))?;
            if !res.status().is_success() {
                return Err(GatewayError::Rpc(format!("unspent query returned {}", res.status())));
            }
            let entries: Vec<RestUnspent> =
                res.json().await.map_err(|e| GatewayError::Rpc(e.to_string()))?;
            Ok(entries
                .into_iter()
                .map(|u| ChainUnspent {
                    tx_id: u.tx_hash,
                    output_index: u.tx_pos,
                    satoshis: u.value,
                })
                .collect())
        })
        .await
    }

    async fn get_raw_tx(&self, txid: &str) -> GatewayResult<String> {
        self.with_failover("get_raw_tx", |base| async move {
            let url = format!("{}/tx/{}/hex", base, txid);
            let res = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| GatewayError::Rpc(e.to_string()))?;
            if res.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(GatewayError::NotFound(txid.to_string()));
            }
            if !res.status().is_success() {
                return Err(GatewayError::Rpc(format!("raw tx query returned {}", res.status())));
            }
            let body = res.text().await.map_err(|e| GatewayError::Rpc(e.to_string()))?;
            Ok(body.trim().trim_matches('"').to_string())
        })
        .await
    }

    async fn broadcast(&self, raw_hex: &str) -> GatewayResult<String> {
        let body = serde_json::json!({ "txhex": raw_hex });
        self.with_failover("broadcast", |base| {
            let body = body.clone();
            async move {
                let url = format!("{}/tx/raw", base);
                let res = self
                    .client
                    .post(url)
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| GatewayError::Rpc(e.to_string()))?;
                let status = res.status();
                let text = res.text().await.map_err(|e| GatewayError::Rpc(e.to_string()))?;
                if status.is_success() {
                    Ok(text.trim().trim_matches('"').to_string())
                } else if status.is_server_error() && !text.contains(TOO_LONG_MEMPOOL_CHAIN) {
                    Err(GatewayError::Rpc(format!("broadcast returned {}: {}", status, text)))
                } else {
                    Err(classify_rejection(&text))
                }
            }
        })
        .await
    }
}

impl std::fmt::Debug for HttpChainGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpChainGateway")
            .field("base_url", &self.config.base_url)
            .field("network", &self.network)
            .field("timeout_secs", &self.config.timeout_secs)
            .finish()
    }
}
