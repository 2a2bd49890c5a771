//! A fee-paying wallet and its guarded-use protocol.

use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::chain::gateway::ChainGateway;
use crate::chain::keys::SigningKey;
use crate::chain::transaction::{build_split_tx, plan_split, SignedTx};
use crate::chain::types::{now_ms, GatewayError, Utxo};
use crate::config::schema::PoolConfig;
use crate::error::{RelayError, RelayResult};
use crate::observability::metrics;
use crate::store::UtxoStore;
use crate::wallet::pool::{SelectionLimits, SplitSkip, UtxoPool};

/// Result of one auto-split check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitOutcome {
    Skipped(SplitSkip),
    Split { txid: String, outputs: usize },
}

/// Point-in-time view of a wallet for the admin endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletStatus {
    pub address: String,
    pub balance: u64,
    pub utxo_count: usize,
    pub eligible_count: usize,
    pub backed_off_count: usize,
    pub unit_satoshis: u64,
    pub split_in_flight: bool,
}

/// Owns one signing key and the pool of outputs it can spend.
pub struct FeeWallet {
    key: SigningKey,
    address: String,
    unit_satoshis: u64,
    fee_rate: f64,
    limits: PoolConfig,
    pool: UtxoPool,
    gateway: Arc<dyn ChainGateway>,
    store: Arc<dyn UtxoStore>,
    splitting: AtomicBool,
}

impl FeeWallet {
    pub fn new(
        key: SigningKey,
        unit_satoshis: u64,
        fee_rate: f64,
        limits: PoolConfig,
        gateway: Arc<dyn ChainGateway>,
        store: Arc<dyn UtxoStore>,
    ) -> Self {
        let address = key.address_string();
        Self {
            key,
            address,
            unit_satoshis,
            fee_rate,
            limits,
            pool: UtxoPool::default(),
            gateway,
            store,
            splitting: AtomicBool::new(false),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn key(&self) -> &SigningKey {
        &self.key
    }

    pub fn fee_rate(&self) -> f64 {
        self.fee_rate
    }

    pub fn balance(&self) -> u64 {
        self.pool.balance()
    }

    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    /// Outputs currently in the pool.
    pub fn utxos(&self) -> Vec<Utxo> {
        self.pool.snapshot()
    }

    pub fn status(&self) -> WalletStatus {
        WalletStatus {
            address: self.address.clone(),
            balance: self.pool.balance(),
            utxo_count: self.pool.len(),
            eligible_count: self.pool.eligible_count(now_ms()),
            backed_off_count: self.pool.backed_off_count(),
            unit_satoshis: self.unit_satoshis,
            split_in_flight: self.splitting.load(Ordering::Acquire),
        }
    }

    fn selection_limits(&self) -> SelectionLimits {
        SelectionLimits {
            dust: self.limits.dust_satoshis,
            max_attempts: self.limits.max_selection_attempts,
        }
    }

    /// Reconcile the persisted outputs with the chain and load the result into the pool.
    ///
    /// Outputs known to both keep their persisted selection metadata, new
    /// chain outputs start fresh, and persisted outputs the chain no longer
    /// reports are dropped.
    pub async fn sync(&self) -> RelayResult<()> {
        let persisted = self.store.list(&self.address).await?;
        let on_chain = self.gateway.get_unspents(&self.address).await?;

        let merged: Vec<Utxo> = on_chain
            .into_iter()
            .map(|unspent| {
                persisted
                    .iter()
                    .find(|p| p.is_outpoint(&unspent.tx_id, unspent.output_index))
                    .cloned()
                    .unwrap_or_else(|| Utxo::from(unspent))
            })
            .collect();

        self.store.replace_all(&self.address, &merged).await?;
        let count = merged.len();
        self.pool.replace(merged);
        metrics::record_pool_size(&self.address, count);

        let balance = self.pool.balance();
        tracing::info!(address = %self.address, utxos = count, balance, "Fee wallet synced");
        if balance < self.limits.lowest_balance {
            tracing::warn!(
                address = %self.address,
                balance,
                lowest_balance = self.limits.lowest_balance,
                "Fee wallet balance is low"
            );
        }
        Ok(())
    }

    /// Claim eligible outputs summing to at least `target`, or nothing.
    pub fn fetch(&self, target: u64) -> Vec<Utxo> {
        let picked = self.pool.reserve(target, now_ms(), self.selection_limits());
        if picked.is_empty() {
            tracing::debug!(
                address = %self.address,
                target,
                balance = self.pool.balance(),
                "Reservation unmet"
            );
        }
        metrics::record_pool_size(&self.address, self.pool.len());
        picked
    }

    /// Put reserved outputs back into the pool.
    pub fn recycle(&self, utxos: Vec<Utxo>) {
        tracing::debug!(address = %self.address, count = utxos.len(), "Recycling outputs");
        self.pool.release(utxos);
        metrics::record_pool_size(&self.address, self.pool.len());
    }

    /// Credit new outputs to the pool and the store.
    pub async fn add_utxos(&self, utxos: Vec<Utxo>) -> RelayResult<()> {
        self.pool.release(utxos.clone());
        metrics::record_pool_size(&self.address, self.pool.len());
        self.store.insert_many(&self.address, &utxos).await?;
        Ok(())
    }

    /// Credit the last output of `tx` if it pays this wallet.
    ///
    /// The output joins the pool before the store write, so a store failure
    /// leaves it spendable and is returned to the caller.
    pub async fn credit_change(&self, tx: &SignedTx) -> RelayResult<()> {
        let Some((index, value, script)) = tx.trailing_output() else {
            return Ok(());
        };
        if *script != self.key.p2pkh_script() {
            tracing::debug!(txid = %tx.txid, "Trailing output does not pay the fee wallet");
            return Ok(());
        }
        let mut change = Utxo::new(tx.txid.clone(), index, value);
        if self.limits.change_settle_ms > 0 {
            change.eligible_after_ms = now_ms() + self.limits.change_settle_ms;
        }
        self.add_utxos(vec![change]).await.inspect_err(|e| {
            tracing::error!(txid = %tx.txid, error = %e, "Failed to persist change output");
        })
    }

    /// Reserve outputs worth `estimate`, run `operation` with them, and
    /// settle the reservation according to its outcome.
    ///
    /// - success: the outputs are spent and deleted from the store
    /// - persistence error: the operation already broadcast, so the outputs
    ///   are settled as spent and the error is returned
    /// - chain-depth rejection: each output is backed off one step and
    ///   recycled, and the error becomes `UnconfirmedChainTooDeep`
    /// - any other error: the outputs are recycled unchanged
    ///
    /// If the returned future is dropped before `operation` finishes, the
    /// outputs go back to the pool unchanged. An auto-split check is spawned
    /// after every settled reservation.
    pub async fn try_use_utxos<T, F, Fut>(self: &Arc<Self>, estimate: u64, operation: F) -> RelayResult<T>
    where
        F: FnOnce(Vec<Utxo>) -> Fut,
        Fut: Future<Output = RelayResult<T>>,
    {
        let reserved = self.fetch(estimate);
        if reserved.is_empty() {
            metrics::record_reservation("empty");
            self.spawn_adjust();
            return Err(RelayError::NoFundsAvailable { needed: estimate });
        }
        metrics::record_reservation("reserved");

        let reservation = Reservation {
            wallet: self,
            utxos: reserved,
        };
        let result = operation(reservation.utxos.clone()).await;
        let reserved = reservation.settle();

        let result = match result {
            Ok(value) => self.delete_spent(&reserved).await.map(|()| value),
            Err(e @ RelayError::Persistence(_)) => {
                // Logged by delete_spent.
                let _ = self.delete_spent(&reserved).await;
                Err(e)
            }
            Err(RelayError::Gateway(GatewayError::TooLongMempoolChain)) => {
                match self.back_off(reserved).await {
                    Ok(()) => Err(RelayError::UnconfirmedChainTooDeep),
                    Err(e) => Err(e),
                }
            }
            Err(e) => {
                self.recycle(reserved);
                Err(e)
            }
        };

        self.spawn_adjust();
        result
    }

    /// Remove spent outputs from the store, attempting every one.
    async fn delete_spent(&self, spent: &[Utxo]) -> RelayResult<()> {
        let mut failure = None;
        for utxo in spent {
            if let Err(e) = self
                .store
                .remove(&self.address, &utxo.tx_id, utxo.output_index)
                .await
            {
                tracing::error!(
                    tx_id = %utxo.tx_id,
                    output_index = utxo.output_index,
                    error = %e,
                    "Failed to delete spent output"
                );
                failure.get_or_insert(e);
            }
        }
        match failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    async fn back_off(&self, mut utxos: Vec<Utxo>) -> RelayResult<()> {
        let now = now_ms();
        let mut failure = None;
        for utxo in &mut utxos {
            utxo.backoff_count += 1;
            utxo.eligible_after_ms =
                now + self.limits.backoff_cooldown_ms * u64::from(utxo.backoff_count);
            if let Err(e) = self.store.update(&self.address, utxo).await {
                tracing::error!(tx_id = %utxo.tx_id, error = %e, "Failed to persist back-off");
                failure.get_or_insert(e);
            }
        }
        tracing::warn!(
            address = %self.address,
            count = utxos.len(),
            "Unconfirmed chain too deep, backing off outputs"
        );
        metrics::record_chain_backoff(utxos.len());
        self.recycle(utxos);
        match failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Run an auto-split check in the background.
    pub fn spawn_adjust(self: &Arc<Self>) {
        let wallet = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = wallet.adjust().await {
                tracing::warn!(address = %wallet.address, error = %e, "Auto-split failed");
            }
        });
    }

    /// Split the largest output into unit-sized outputs when the pool runs low.
    pub async fn adjust(&self) -> RelayResult<SplitOutcome> {
        if self.splitting.swap(true, Ordering::AcqRel) {
            return Ok(SplitOutcome::Skipped(SplitSkip::AlreadyRunning));
        }
        let outcome = self.split_largest().await;
        self.splitting.store(false, Ordering::Release);

        match &outcome {
            Ok(SplitOutcome::Split { .. }) => metrics::record_split("split"),
            Ok(SplitOutcome::Skipped(_)) => metrics::record_split("skipped"),
            Err(_) => metrics::record_split("failed"),
        }
        outcome
    }

    async fn split_largest(&self) -> RelayResult<SplitOutcome> {
        let dust = self.limits.dust_satoshis;
        let input = match self
            .pool
            .claim_largest(self.limits.low_water_mark, self.unit_satoshis + dust)
        {
            Ok(utxo) => utxo,
            Err(skip) => {
                if skip != SplitSkip::PoolHealthy {
                    tracing::info!(
                        address = %self.address,
                        balance = self.pool.balance(),
                        reason = ?skip,
                        "Auto-split skipped, insufficient balance"
                    );
                }
                return Ok(SplitOutcome::Skipped(skip));
            }
        };

        let Some(plan) = plan_split(
            input.satoshis,
            self.unit_satoshis,
            self.fee_rate,
            dust,
            self.limits.max_split_outputs,
        ) else {
            let largest = input.satoshis;
            self.pool.release(vec![input]);
            return Ok(SplitOutcome::Skipped(SplitSkip::NothingToSplit { largest }));
        };

        let signed = match build_split_tx(&input, &plan, &self.key) {
            Ok(tx) => tx,
            Err(e) => {
                self.pool.release(vec![input]);
                return Err(e.into());
            }
        };

        if let Err(e) = self.gateway.broadcast(&signed.hex).await {
            metrics::record_broadcast("split", "failed");
            self.pool.release(vec![input]);
            return Err(e.into());
        }
        metrics::record_broadcast("split", "ok");

        let created: Vec<Utxo> = signed
            .tx
            .output
            .iter()
            .enumerate()
            .map(|(i, out)| Utxo::new(signed.txid.clone(), i as u32, out.value.to_sat()))
            .collect();
        let outputs = created.len();

        let removed = self
            .store
            .remove(&self.address, &input.tx_id, input.output_index)
            .await;
        self.add_utxos(created).await.inspect_err(|e| {
            tracing::error!(txid = %signed.txid, error = %e, "Failed to persist split outputs");
        })?;
        removed.inspect_err(|e| {
            tracing::error!(tx_id = %input.tx_id, error = %e, "Failed to delete split input");
        })?;

        tracing::info!(
            address = %self.address,
            txid = %signed.txid,
            outputs,
            fee = plan.fee,
            balance = self.pool.balance(),
            utxos = self.pool.len(),
            "Split finished"
        );
        Ok(SplitOutcome::Split {
            txid: signed.txid,
            outputs,
        })
    }
}

/// Outputs claimed from the pool for one guarded use.
///
/// Dropping a reservation that was never settled returns its outputs to the
/// pool, so a cancelled request cannot strand them.
struct Reservation<'a> {
    wallet: &'a FeeWallet,
    utxos: Vec<Utxo>,
}

impl Reservation<'_> {
    /// Hand the outputs to the caller for settlement.
    fn settle(mut self) -> Vec<Utxo> {
        std::mem::take(&mut self.utxos)
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.utxos.is_empty() {
            return;
        }
        tracing::warn!(
            address = %self.wallet.address,
            count = self.utxos.len(),
            "Reservation dropped before settling, recycling outputs"
        );
        metrics::record_reservation("cancelled");
        self.wallet.recycle(std::mem::take(&mut self.utxos));
    }
}

impl std::fmt::Debug for FeeWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeeWallet")
            .field("address", &self.address)
            .field("unit_satoshis", &self.unit_satoshis)
            .field("pool_size", &self.pool.len())
            .finish()
    }
}
