//! Startup orchestration.
//!
//! # Responsibilities
//! - Load fee wallet keys from the environment variables the config names
//! - Reconcile every wallet with the chain before traffic is accepted
//! - Assemble the [`TokenOrchestrator`] that request handlers share
//!
//! # Design Decisions
//! - Fail fast: a missing key or a failed sync is fatal
//! - Wallets initialize in config order, not concurrently

use std::sync::Arc;

use crate::builder::ProtocolBuilder;
use crate::chain::gateway::ChainGateway;
use crate::chain::keys::SigningKey;
use crate::config::schema::RelayConfig;
use crate::error::RelayResult;
use crate::store::{IssuerStore, TokenUtxoStore, UtxoStore};
use crate::token::{FeeSchedule, TokenOrchestrator};
use crate::wallet::FeeWallet;

/// External collaborators the orchestrator is wired to.
#[derive(Clone)]
pub struct Services {
    pub gateway: Arc<dyn ChainGateway>,
    pub builder: Arc<dyn ProtocolBuilder>,
    pub utxos: Arc<dyn UtxoStore>,
    pub issuers: Arc<dyn IssuerStore>,
    pub tokens: Arc<dyn TokenUtxoStore>,
}

/// Build the orchestrator and sync every configured fee wallet.
pub async fn build_orchestrator(
    config: &RelayConfig,
    services: Services,
) -> RelayResult<TokenOrchestrator> {
    let network = config.network;
    let mut orchestrator = TokenOrchestrator::new(
        network,
        services.builder.clone(),
        services.gateway.clone(),
        services.issuers.clone(),
        services.tokens.clone(),
        FeeSchedule::new(config.fees.clone()),
    );

    let default_env = config.default_wallet().map(|w| w.key_env.clone());

    for wallet_config in &config.wallets {
        let key = SigningKey::from_env(&wallet_config.key_env, network)?;
        let wallet = Arc::new(FeeWallet::new(
            key,
            wallet_config.unit_satoshis,
            config.fees.fee_rate,
            config.pool.clone(),
            services.gateway.clone(),
            services.utxos.clone(),
        ));

        wallet.sync().await?;

        tracing::info!(
            address = wallet.address(),
            key_env = %wallet_config.key_env,
            unit_satoshis = wallet_config.unit_satoshis,
            "Fee wallet ready"
        );

        let is_default = default_env.as_deref() == Some(wallet_config.key_env.as_str());
        orchestrator.register_wallet(wallet, is_default);
    }

    Ok(orchestrator)
}
