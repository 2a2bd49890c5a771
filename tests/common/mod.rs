//! Shared collaborators for integration tests.
//!
//! `MockChain` keeps unspents and raw transactions in memory and accepts
//! any decodable broadcast. `MockBuilder` assembles real unsigned templates
//! that spend the offered fee outputs, so signing and change crediting run
//! end to end.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::absolute::LockTime;
use bitcoin::consensus::serialize;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::SecretKey;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use parking_lot::Mutex;

use ft_relay::builder::{
    BuilderError, BuilderResult, FeeInputs, GenesisRequest, IssueRequest, ProtocolBuilder,
    RouteCheckRequest, TransferRequest, TxTemplate,
};
use ft_relay::chain::gateway::ChainGateway;
use ft_relay::chain::keys::{parse_address, SigningKey};
use ft_relay::chain::transaction::{decode_tx, Prevout, SIGHASH_ALL_FORKID};
use ft_relay::chain::types::{ChainUnspent, GatewayError, GatewayResult, Network};
use ft_relay::config::schema::{FeeConfig, PoolConfig};
use ft_relay::store::{
    IssuerStore, MemoryStore, StoreError, StoreResult, TokenUtxoStore, UtxoStore,
};
use ft_relay::chain::types::Utxo;
use ft_relay::token::{FeeSchedule, IssuerRecord, TokenAmount, TokenOrchestrator, TokenUtxo};
use ft_relay::wallet::FeeWallet;

pub const NETWORK: Network = Network::Testnet;

/// Value of every contract and token output the mock builder creates.
pub const CONTRACT_SATOSHIS: u64 = 1_000;
/// Fee the mock builder leaves out of every template.
pub const TEMPLATE_FEE: u64 = 300;

pub fn key(byte: u8) -> SigningKey {
    SigningKey::from_secret(SecretKey::from_slice(&[byte; 32]).unwrap(), NETWORK)
}

/// Pool tuning that keeps auto-split out of the way.
pub fn quiet_pool() -> PoolConfig {
    PoolConfig {
        low_water_mark: 0,
        ..PoolConfig::default()
    }
}

fn txin(txid: Txid, vout: u32) -> TxIn {
    TxIn {
        previous_output: OutPoint::new(txid, vout),
        script_sig: ScriptBuf::new(),
        sequence: Sequence::MAX,
        witness: Witness::default(),
    }
}

fn parse_txid(id: &str) -> BuilderResult<Txid> {
    id.parse()
        .map_err(|e| BuilderError::Transport(format!("bad txid {}: {}", id, e)))
}

/// Contract output placeholder.
pub fn contract_script() -> ScriptBuf {
    ScriptBuf::from_bytes(vec![0x00, 0x75, 0x51])
}

/// Token output placeholder that still names its holder.
pub fn token_script(holder: &str) -> ScriptBuf {
    let mut bytes = vec![0x00, 0x75];
    if let Ok(address) = parse_address(holder, NETWORK) {
        bytes.extend_from_slice(address.script_pubkey().as_bytes());
    }
    ScriptBuf::from_bytes(bytes)
}

/// A broadcast failure to inject.
#[derive(Debug, Clone)]
pub enum Fault {
    TooLongChain,
    Rejected(String),
}

#[derive(Default)]
pub struct MockChain {
    unspents: Mutex<HashMap<String, Vec<ChainUnspent>>>,
    raw_txs: Mutex<HashMap<String, String>>,
    broadcasts: Mutex<Vec<String>>,
    faults: Mutex<VecDeque<Fault>>,
    broadcast_delay: Mutex<Option<Duration>>,
    fail_query: AtomicBool,
    nonce: AtomicU32,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a confirmed funding transaction paying `values` to `key`.
    pub fn fund(&self, key: &SigningKey, values: &[u64]) -> String {
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let tx = Transaction {
            version: Version::ONE,
            lock_time: LockTime::ZERO,
            input: vec![txin(Txid::from_byte_array([0xee; 32]), nonce)],
            output: values
                .iter()
                .map(|v| TxOut {
                    value: Amount::from_sat(*v),
                    script_pubkey: key.p2pkh_script(),
                })
                .collect(),
        };
        let txid = tx.compute_txid().to_string();
        self.raw_txs
            .lock()
            .insert(txid.clone(), hex::encode(serialize(&tx)));

        let mut unspents = self.unspents.lock();
        let entry = unspents.entry(key.address_string()).or_default();
        for (i, value) in values.iter().enumerate() {
            entry.push(ChainUnspent {
                tx_id: txid.clone(),
                output_index: i as u32,
                satoshis: *value,
            });
        }
        txid
    }

    pub fn set_unspents(&self, address: &str, unspents: Vec<ChainUnspent>) {
        self.unspents.lock().insert(address.to_string(), unspents);
    }

    pub fn fail_next_broadcast(&self, fault: Fault) {
        self.faults.lock().push_back(fault);
    }

    /// Fail the next unspent query with a transport error.
    pub fn fail_next_query(&self) {
        self.fail_query.store(true, Ordering::SeqCst);
    }

    pub fn set_broadcast_delay(&self, delay: Duration) {
        *self.broadcast_delay.lock() = Some(delay);
    }

    /// Txids accepted so far, in order.
    pub fn broadcasts(&self) -> Vec<String> {
        self.broadcasts.lock().clone()
    }

    pub fn raw_tx(&self, txid: &str) -> Option<Transaction> {
        let raw = self.raw_txs.lock().get(txid).cloned()?;
        decode_tx(&raw).ok()
    }
}

#[async_trait]
impl ChainGateway for MockChain {
    async fn get_unspents(&self, address: &str) -> GatewayResult<Vec<ChainUnspent>> {
        if self.fail_query.swap(false, Ordering::SeqCst) {
            return Err(GatewayError::Rpc("injected query failure".to_string()));
        }
        Ok(self.unspents.lock().get(address).cloned().unwrap_or_default())
    }

    async fn get_raw_tx(&self, txid: &str) -> GatewayResult<String> {
        self.raw_txs
            .lock()
            .get(txid)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(txid.to_string()))
    }

    async fn broadcast(&self, raw_hex: &str) -> GatewayResult<String> {
        let delay = *self.broadcast_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let fault = self.faults.lock().pop_front();
        match fault {
            Some(Fault::TooLongChain) => return Err(GatewayError::TooLongMempoolChain),
            Some(Fault::Rejected(reason)) => return Err(GatewayError::Rejected(reason)),
            None => {}
        }

        let tx = decode_tx(raw_hex).map_err(|e| GatewayError::Rejected(e.to_string()))?;
        let txid = tx.compute_txid().to_string();
        self.raw_txs.lock().insert(txid.clone(), raw_hex.to_string());
        self.broadcasts.lock().push(txid.clone());
        Ok(txid)
    }
}

/// A store write that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Write {
    UtxoInsert,
    UtxoRemove,
    UtxoUpdate,
    UtxoReplace,
    IssuerInsert,
    IssuerUpdate,
    TokenInsert,
    TokenRemove,
}

/// `MemoryStore` whose writes fail on demand. Reads always pass through.
#[derive(Clone)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    failing: Arc<Mutex<HashSet<Write>>>,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            failing: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn fail(&self, write: Write) {
        self.failing.lock().insert(write);
    }

    pub fn heal(&self, write: Write) {
        self.failing.lock().remove(&write);
    }

    fn check(&self, write: Write) -> StoreResult<()> {
        if self.failing.lock().contains(&write) {
            return Err(StoreError::Unavailable(format!("{:?} disabled", write)));
        }
        Ok(())
    }
}

#[async_trait]
impl UtxoStore for FlakyStore {
    async fn list(&self, address: &str) -> StoreResult<Vec<Utxo>> {
        UtxoStore::list(&self.inner, address).await
    }

    async fn insert_many(&self, address: &str, utxos: &[Utxo]) -> StoreResult<()> {
        self.check(Write::UtxoInsert)?;
        UtxoStore::insert_many(&self.inner, address, utxos).await
    }

    async fn remove(&self, address: &str, tx_id: &str, output_index: u32) -> StoreResult<()> {
        self.check(Write::UtxoRemove)?;
        UtxoStore::remove(&self.inner, address, tx_id, output_index).await
    }

    async fn update(&self, address: &str, utxo: &Utxo) -> StoreResult<()> {
        self.check(Write::UtxoUpdate)?;
        UtxoStore::update(&self.inner, address, utxo).await
    }

    async fn clear(&self, address: &str) -> StoreResult<()> {
        self.check(Write::UtxoReplace)?;
        self.inner.clear(address).await
    }

    async fn replace_all(&self, address: &str, utxos: &[Utxo]) -> StoreResult<()> {
        self.check(Write::UtxoReplace)?;
        self.inner.replace_all(address, utxos).await
    }
}

#[async_trait]
impl IssuerStore for FlakyStore {
    async fn insert(&self, record: IssuerRecord) -> StoreResult<()> {
        self.check(Write::IssuerInsert)?;
        self.inner.insert(record).await
    }

    async fn get(&self, token_id: &str) -> StoreResult<Option<IssuerRecord>> {
        self.inner.get(token_id).await
    }

    async fn update(&self, record: &IssuerRecord) -> StoreResult<()> {
        self.check(Write::IssuerUpdate)?;
        IssuerStore::update(&self.inner, record).await
    }

    async fn list(&self, page_size: usize, page: usize) -> StoreResult<(Vec<IssuerRecord>, usize)> {
        IssuerStore::list(&self.inner, page_size, page).await
    }
}

#[async_trait]
impl TokenUtxoStore for FlakyStore {
    async fn list(&self, holder: &str, token_id: &str) -> StoreResult<Vec<TokenUtxo>> {
        TokenUtxoStore::list(&self.inner, holder, token_id).await
    }

    async fn insert_many(&self, utxos: &[TokenUtxo]) -> StoreResult<()> {
        self.check(Write::TokenInsert)?;
        TokenUtxoStore::insert_many(&self.inner, utxos).await
    }

    async fn remove(
        &self,
        holder: &str,
        token_id: &str,
        tx_id: &str,
        output_index: u32,
    ) -> StoreResult<()> {
        self.check(Write::TokenRemove)?;
        TokenUtxoStore::remove(&self.inner, holder, token_id, tx_id, output_index).await
    }
}

/// Template under construction: inputs with their prevouts, then outputs.
struct Draft {
    inputs: Vec<TxIn>,
    prevouts: Vec<Prevout>,
    outputs: Vec<TxOut>,
}

impl Draft {
    fn new() -> Self {
        Self {
            inputs: Vec::new(),
            prevouts: Vec::new(),
            outputs: Vec::new(),
        }
    }

    fn spend(&mut self, txid: Txid, vout: u32, satoshis: u64, script: &ScriptBuf) {
        self.inputs.push(txin(txid, vout));
        self.prevouts.push(Prevout {
            satoshis,
            script: hex::encode(script.as_bytes()),
        });
    }

    fn pay(&mut self, satoshis: u64, script: ScriptBuf) {
        self.outputs.push(TxOut {
            value: Amount::from_sat(satoshis),
            script_pubkey: script,
        });
    }

    /// Spend the fee outputs and append change to the fee wallet.
    fn finish(mut self, fee: &FeeInputs) -> BuilderResult<TxTemplate> {
        let fee_script = parse_address(&fee.utxo_address, fee.network)
            .map_err(|e| BuilderError::Transport(e.to_string()))?
            .script_pubkey();

        let mut funded = 0u64;
        for utxo in &fee.utxos {
            self.spend(parse_txid(&utxo.tx_id)?, utxo.output_index, utxo.satoshis, &fee_script);
            funded += utxo.satoshis;
        }

        let spent: u64 = self.outputs.iter().map(|o| o.value.to_sat()).sum();
        let change = funded
            .checked_sub(spent + TEMPLATE_FEE)
            .ok_or_else(|| BuilderError::Transport("fee inputs too small".to_string()))?;
        self.pay(change, fee_script);

        let tx = Transaction {
            version: Version::ONE,
            lock_time: LockTime::ZERO,
            input: self.inputs,
            output: self.outputs,
        };
        Ok(TxTemplate {
            raw: hex::encode(serialize(&tx)),
            prevouts: self.prevouts,
            sigtype: SIGHASH_ALL_FORKID,
        })
    }
}

#[derive(Default)]
pub struct MockBuilder {
    pub genesis_calls: Mutex<Vec<GenesisRequest>>,
    pub issue_calls: Mutex<Vec<IssueRequest>>,
    pub route_check_calls: Mutex<Vec<RouteCheckRequest>>,
    pub transfer_calls: Mutex<Vec<TransferRequest>>,
    reject: Mutex<Option<i64>>,
}

impl MockBuilder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reject the next request of any kind with `code`.
    pub fn reject_next(&self, code: i64) {
        *self.reject.lock() = Some(code);
    }

    fn check(&self, route: &str) -> BuilderResult<()> {
        match self.reject.lock().take() {
            Some(code) => Err(BuilderError::Rejected {
                route: route.to_string(),
                code,
                msg: "rejected by test".to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ProtocolBuilder for MockBuilder {
    async fn genesis(&self, req: &GenesisRequest) -> BuilderResult<TxTemplate> {
        self.genesis_calls.lock().push(req.clone());
        self.check("/genesis")?;

        let mut draft = Draft::new();
        draft.pay(CONTRACT_SATOSHIS, contract_script());
        draft.finish(&req.fee)
    }

    async fn issue(&self, req: &IssueRequest) -> BuilderResult<TxTemplate> {
        self.issue_calls.lock().push(req.clone());
        self.check("/issue")?;

        let mut draft = Draft::new();
        draft.spend(
            parse_txid(&req.spend_by_tx_id)?,
            req.spend_by_output_index,
            CONTRACT_SATOSHIS,
            &contract_script(),
        );
        if req.allow_increase_issues {
            draft.pay(CONTRACT_SATOSHIS, contract_script());
        }
        draft.pay(CONTRACT_SATOSHIS, token_script(&req.receiver_address));
        draft.finish(&req.fee)
    }

    async fn route_check(&self, req: &RouteCheckRequest) -> BuilderResult<TxTemplate> {
        self.route_check_calls.lock().push(req.clone());
        self.check("/routeCheck")?;

        let mut draft = Draft::new();
        draft.pay(CONTRACT_SATOSHIS, contract_script());
        draft.finish(&req.fee)
    }

    async fn transfer(&self, req: &TransferRequest) -> BuilderResult<TxTemplate> {
        self.transfer_calls.lock().push(req.clone());
        self.check("/transfer")?;

        let mut draft = Draft::new();
        for utxo in &req.ft_utxos {
            let script = ScriptBuf::from_bytes(
                hex::decode(&utxo.locking_script)
                    .map_err(|e| BuilderError::Transport(e.to_string()))?,
            );
            draft.spend(parse_txid(&utxo.tx_id)?, utxo.output_index, utxo.satoshis, &script);
        }
        let route_check = decode_tx(&req.route_check_hex)
            .map_err(|e| BuilderError::Transport(e.to_string()))?;
        draft.spend(route_check.compute_txid(), 0, CONTRACT_SATOSHIS, &contract_script());

        for receiver in &req.receivers {
            draft.pay(CONTRACT_SATOSHIS, token_script(&receiver.address));
        }
        draft.finish(&req.fee)
    }
}

/// An orchestrator with one synced fee wallet over mock collaborators.
pub struct Harness {
    pub chain: Arc<MockChain>,
    pub builder: Arc<MockBuilder>,
    pub store: MemoryStore,
    /// The store every collaborator writes through.
    pub faults: FlakyStore,
    pub fee_key: SigningKey,
    pub wallet: Arc<FeeWallet>,
    pub orchestrator: Arc<TokenOrchestrator>,
}

pub async fn harness(fee_outputs: &[u64]) -> Harness {
    let chain = MockChain::new();
    let builder = MockBuilder::new();
    let store = MemoryStore::new(None);
    let faults = FlakyStore::new(store.clone());
    let fee_key = key(1);
    if !fee_outputs.is_empty() {
        chain.fund(&fee_key, fee_outputs);
    }

    let wallet = Arc::new(FeeWallet::new(
        fee_key.clone(),
        20_000,
        0.5,
        quiet_pool(),
        chain.clone(),
        Arc::new(faults.clone()),
    ));
    wallet.sync().await.unwrap();

    let mut orchestrator = TokenOrchestrator::new(
        NETWORK,
        builder.clone(),
        chain.clone(),
        Arc::new(faults.clone()),
        Arc::new(faults.clone()),
        FeeSchedule::new(FeeConfig::default()),
    );
    orchestrator.register_wallet(wallet.clone(), true);

    Harness {
        chain,
        builder,
        store,
        faults,
        fee_key,
        wallet,
        orchestrator: Arc::new(orchestrator),
    }
}

/// Put `amounts` directly into the token store as outputs of `holder`.
pub async fn seed_tokens(store: &MemoryStore, token_id: &str, holder: &SigningKey, amounts: &[u128]) {
    let holder_address = holder.address_string();
    let utxos: Vec<TokenUtxo> = amounts
        .iter()
        .enumerate()
        .map(|(i, amount)| TokenUtxo {
            token_id: token_id.to_string(),
            tx_id: Txid::from_byte_array([i as u8 + 1; 32]).to_string(),
            output_index: 0,
            satoshis: CONTRACT_SATOSHIS,
            locking_script: hex::encode(token_script(&holder_address).as_bytes()),
            holder_address: holder_address.clone(),
            token_amount: TokenAmount(*amount),
            raw_tx: String::new(),
            predecessor_tx_id: String::new(),
            predecessor_output_index: 0,
            predecessor_raw_tx: String::new(),
            predecessor_holder_address: String::new(),
            predecessor_token_amount: TokenAmount::ZERO,
        })
        .collect();
    TokenUtxoStore::insert_many(store, &utxos).await.unwrap();
}
