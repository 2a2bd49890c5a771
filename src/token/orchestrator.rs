//! Token operation orchestration: genesis, issue and read-side queries.
//!
//! Transfers and merges live in `transfer.rs`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::builder::{FeeInputs, GenesisRequest, IssueRequest, ProtocolBuilder, TxTemplate};
use crate::chain::gateway::ChainGateway;
use crate::chain::keys::{parse_address, SigningKey};
use crate::chain::transaction::{sign_template, SignedTx, TxError};
use crate::chain::types::{Network, Utxo};
use crate::error::{RelayError, RelayResult};
use crate::observability::metrics;
use crate::store::{IssuerStore, TokenUtxoStore};
use crate::token::fees::FeeSchedule;
use crate::token::types::{
    IssuerPage, IssuerRecord, IssuerSummary, TokenAmount, TokenBalance, TokenUtxo,
};
use crate::wallet::{FeeWallet, WalletStatus};

/// Largest page served by [`TokenOrchestrator::list_issuers`].
pub const MAX_PAGE_SIZE: usize = 100;

/// Runs token operations against the fee wallets, builder, gateway and stores.
pub struct TokenOrchestrator {
    pub(super) network: Network,
    pub(super) wallets: HashMap<String, Arc<FeeWallet>>,
    pub(super) default_wallet: Option<String>,
    pub(super) builder: Arc<dyn ProtocolBuilder>,
    pub(super) gateway: Arc<dyn ChainGateway>,
    pub(super) issuers: Arc<dyn IssuerStore>,
    pub(super) tokens: Arc<dyn TokenUtxoStore>,
    pub(super) fees: FeeSchedule,
}

impl TokenOrchestrator {
    pub fn new(
        network: Network,
        builder: Arc<dyn ProtocolBuilder>,
        gateway: Arc<dyn ChainGateway>,
        issuers: Arc<dyn IssuerStore>,
        tokens: Arc<dyn TokenUtxoStore>,
        fees: FeeSchedule,
    ) -> Self {
        Self {
            network,
            wallets: HashMap::new(),
            default_wallet: None,
            builder,
            gateway,
            issuers,
            tokens,
            fees,
        }
    }

    /// Register a fee wallet. The first wallet, or any registered with
    /// `is_default`, pays for addresses without a wallet of their own.
    pub fn register_wallet(&mut self, wallet: Arc<FeeWallet>, is_default: bool) {
        let address = wallet.address().to_string();
        if is_default || self.default_wallet.is_none() {
            self.default_wallet = Some(address.clone());
        }
        self.wallets.insert(address, wallet);
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn wallets(&self) -> impl Iterator<Item = &Arc<FeeWallet>> {
        self.wallets.values()
    }

    /// Fee wallet paying for `payer`: its own wallet if registered, else the default.
    pub fn wallet_for(&self, payer: &str) -> RelayResult<Arc<FeeWallet>> {
        self.wallets
            .get(payer)
            .or_else(|| {
                self.default_wallet
                    .as_ref()
                    .and_then(|address| self.wallets.get(address))
            })
            .cloned()
            .ok_or_else(|| RelayError::InvalidRequest("no fee wallet configured".to_string()))
    }

    pub(super) fn fee_inputs(&self, wallet: &FeeWallet, utxos: Vec<Utxo>) -> FeeInputs {
        FeeInputs {
            utxos,
            utxo_address: wallet.address().to_string(),
            feeb: wallet.fee_rate(),
            network: self.network,
        }
    }

    pub(super) fn sign(
        &self,
        template: &TxTemplate,
        wallet: &FeeWallet,
        owner: &SigningKey,
    ) -> RelayResult<SignedTx> {
        Ok(sign_template(
            &template.raw,
            &template.prevouts,
            template.sigtype,
            wallet.key(),
            owner,
        )?)
    }

    pub(super) async fn broadcast(&self, kind: &'static str, tx: &SignedTx) -> RelayResult<()> {
        match self.gateway.broadcast(&tx.hex).await {
            Ok(txid) => {
                if txid != tx.txid {
                    tracing::warn!(local = %tx.txid, gateway = %txid, kind, "Gateway reported a different txid");
                }
                metrics::record_broadcast(kind, "ok");
                tracing::info!(txid = %tx.txid, kind, "Broadcast accepted");
                Ok(())
            }
            Err(e) => {
                metrics::record_broadcast(kind, "rejected");
                tracing::warn!(txid = %tx.txid, kind, error = %e, "Broadcast failed");
                Err(e.into())
            }
        }
    }

    /// Time an operation and record its outcome.
    pub(super) async fn observe<T, Fut>(&self, op: &'static str, fut: Fut) -> RelayResult<T>
    where
        Fut: Future<Output = RelayResult<T>>,
    {
        let start = Instant::now();
        let result = fut.await;
        match &result {
            Ok(_) => metrics::record_operation(op, "ok", start),
            Err(e) => {
                metrics::record_operation(op, e.kind(), start);
                tracing::warn!(op, error = %e, retryable = e.is_retryable(), "Operation failed");
            }
        }
        result
    }

    /// Create a new token. Returns its id, the genesis txid.
    pub async fn genesis(
        &self,
        issuer: &SigningKey,
        token_name: &str,
        token_symbol: &str,
        decimals: u8,
    ) -> RelayResult<String> {
        if token_name.trim().is_empty() || token_symbol.trim().is_empty() {
            return Err(RelayError::InvalidRequest(
                "token name and symbol must not be empty".to_string(),
            ));
        }
        let wallet = self.wallet_for(&issuer.address_string())?;
        let payer: &FeeWallet = &wallet;

        self.observe("genesis", async {
            wallet
                .try_use_utxos(self.fees.genesis(), |utxos| async move {
                    let first = utxos.first().cloned().ok_or(RelayError::NoFundsAvailable {
                        needed: self.fees.genesis(),
                    })?;
                    let predecessor_raw_tx = self.gateway.get_raw_tx(&first.tx_id).await?;

                    let request = GenesisRequest {
                        issuer_pk: issuer.public_key_hex(),
                        token_name: token_name.to_string(),
                        token_symbol: token_symbol.to_string(),
                        decimal_num: decimals,
                        fee: self.fee_inputs(payer, utxos),
                    };
                    let template = self.builder.genesis(&request).await?;
                    let signed = self.sign(&template, payer, issuer)?;
                    self.broadcast("genesis", &signed).await?;

                    let record = IssuerRecord {
                        token_id: signed.txid.clone(),
                        contract_tx_id: signed.txid.clone(),
                        contract_output_index: 0,
                        contract_raw_tx: signed.hex.clone(),
                        predecessor_tx_id: first.tx_id.clone(),
                        predecessor_output_index: first.output_index,
                        predecessor_raw_tx,
                        token_name: token_name.to_string(),
                        token_symbol: token_symbol.to_string(),
                        decimals,
                        reissuable: true,
                    };
                    let credited = payer.credit_change(&signed).await;
                    self.issuers.insert(record).await.inspect_err(|e| {
                        tracing::error!(token_id = %signed.txid, error = %e, "Failed to persist issuer record");
                    })?;
                    credited?;

                    tracing::info!(token_id = %signed.txid, symbol = token_symbol, "Genesis complete");
                    Ok(signed.txid)
                })
                .await
        })
        .await
    }

    /// Mint `amount` to `receiver`. With `allow_further` false this is the
    /// final issuance and the contract is closed.
    pub async fn issue(
        &self,
        issuer: &SigningKey,
        token_id: &str,
        amount: TokenAmount,
        receiver: &str,
        allow_further: bool,
    ) -> RelayResult<String> {
        parse_address(receiver, self.network)?;
        let record = self
            .issuers
            .get(token_id)
            .await?
            .ok_or_else(|| RelayError::TokenNotFound(token_id.to_string()))?;
        if !record.reissuable {
            return Err(RelayError::IssuanceClosed(token_id.to_string()));
        }
        let wallet = self.wallet_for(&issuer.address_string())?;
        let payer: &FeeWallet = &wallet;
        let record = &record;

        self.observe("issue", async {
            wallet
                .try_use_utxos(self.fees.issue(), |utxos| async move {
                    let request = IssueRequest {
                        genesis_tx_id: record.contract_tx_id.clone(),
                        genesis_output_index: record.contract_output_index,
                        pre_utxo_tx_id: record.predecessor_tx_id.clone(),
                        pre_utxo_output_index: record.predecessor_output_index,
                        pre_utxo_tx_hex: record.predecessor_raw_tx.clone(),
                        spend_by_tx_id: record.contract_tx_id.clone(),
                        spend_by_output_index: record.contract_output_index,
                        spend_by_tx_hex: record.contract_raw_tx.clone(),
                        issuer_pk: issuer.public_key_hex(),
                        receiver_address: receiver.to_string(),
                        token_amount: amount,
                        allow_increase_issues: allow_further,
                        fee: self.fee_inputs(payer, utxos),
                    };
                    let template = self.builder.issue(&request).await?;
                    let signed = self.sign(&template, payer, issuer)?;

                    let token_index = if allow_further { 1 } else { 0 };
                    let token_out = signed.output(token_index).ok_or_else(|| {
                        TxError::Template(format!("issue template has no output {}", token_index))
                    })?;
                    let minted = TokenUtxo {
                        token_id: token_id.to_string(),
                        tx_id: signed.txid.clone(),
                        output_index: token_index as u32,
                        satoshis: token_out.value.to_sat(),
                        locking_script: hex::encode(token_out.script_pubkey.as_bytes()),
                        holder_address: receiver.to_string(),
                        token_amount: amount,
                        raw_tx: signed.hex.clone(),
                        predecessor_tx_id: record.contract_tx_id.clone(),
                        predecessor_output_index: record.contract_output_index,
                        predecessor_raw_tx: record.contract_raw_tx.clone(),
                        predecessor_holder_address: receiver.to_string(),
                        predecessor_token_amount: TokenAmount::ZERO,
                    };

                    self.broadcast("issue", &signed).await?;

                    let advanced = IssuerRecord {
                        contract_tx_id: signed.txid.clone(),
                        contract_output_index: 0,
                        contract_raw_tx: signed.hex.clone(),
                        predecessor_tx_id: record.contract_tx_id.clone(),
                        predecessor_output_index: record.contract_output_index,
                        predecessor_raw_tx: record.contract_raw_tx.clone(),
                        reissuable: allow_further,
                        ..record.clone()
                    };
                    let credited = payer.credit_change(&signed).await;
                    self.issuers.update(&advanced).await.inspect_err(|e| {
                        tracing::error!(token_id, txid = %signed.txid, error = %e, "Failed to advance issuer record");
                    })?;
                    self.tokens.insert_many(&[minted]).await.inspect_err(|e| {
                        tracing::error!(token_id, txid = %signed.txid, error = %e, "Failed to persist issued token output");
                    })?;
                    credited?;

                    tracing::info!(token_id, txid = %signed.txid, %amount, allow_further, "Issue complete");
                    Ok(signed.txid)
                })
                .await
        })
        .await
    }

    /// Token holdings of `address`.
    pub async fn token_balance(&self, token_id: &str, address: &str) -> RelayResult<TokenBalance> {
        parse_address(address, self.network)?;
        let utxos = self.tokens.list(address, token_id).await?;
        let mut balance = TokenAmount::ZERO;
        for utxo in &utxos {
            balance = balance.checked_add(utxo.token_amount).ok_or_else(|| {
                RelayError::InvalidRequest("token balance overflows".to_string())
            })?;
        }
        Ok(TokenBalance {
            token_id: token_id.to_string(),
            address: address.to_string(),
            balance,
            utxo_count: utxos.len(),
        })
    }

    /// One page (1-based) of issued tokens in creation order.
    pub async fn list_issuers(&self, page_size: usize, current: usize) -> RelayResult<IssuerPage> {
        if page_size == 0 || page_size > MAX_PAGE_SIZE || current == 0 {
            return Err(RelayError::InvalidRequest(format!(
                "pageSize must be 1..={} and currentPage >= 1",
                MAX_PAGE_SIZE
            )));
        }
        let (records, total) = self.issuers.list(page_size, current).await?;
        Ok(IssuerPage {
            list: records.iter().map(IssuerSummary::from).collect(),
            page_size,
            current,
            total,
        })
    }

    /// Status of every registered fee wallet, ordered by address.
    pub fn wallet_status(&self) -> Vec<WalletStatus> {
        let mut statuses: Vec<_> = self.wallets.values().map(|w| w.status()).collect();
        statuses.sort_by(|a, b| a.address.cmp(&b.address));
        statuses
    }
}

impl std::fmt::Debug for TokenOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenOrchestrator")
            .field("network", &self.network)
            .field("wallets", &self.wallets.len())
            .field("default_wallet", &self.default_wallet)
            .finish()
    }
}
