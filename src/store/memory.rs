//! In-memory store with JSON snapshot persistence.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::chain::types::Utxo;
use crate::store::traits::{
    IssuerStore, StoreError, StoreResult, TokenUtxoStore, UtxoStore,
};
use crate::token::types::{IssuerRecord, TokenUtxo};

/// On-disk layout of a snapshot.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    utxos: BTreeMap<String, Vec<Utxo>>,
    #[serde(default)]
    issuers: Vec<IssuerRecord>,
    #[serde(default)]
    token_utxos: Vec<TokenUtxo>,
}

#[derive(Default)]
struct Inner {
    utxos: DashMap<String, Vec<Utxo>>,
    /// token id -> (creation sequence, record)
    issuers: DashMap<String, (u64, IssuerRecord)>,
    issuer_seq: AtomicU64,
    /// (holder, token id) -> outputs in insertion order
    token_utxos: DashMap<(String, String), Vec<TokenUtxo>>,
}

/// Thread-safe store for wallet, issuer and token state.
///
/// Clones share the same maps.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
    snapshot_path: Option<String>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new(snapshot_path: Option<String>) -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            snapshot_path,
        }
    }

    /// Load the snapshot at `path` if it exists; later saves go to the same file.
    pub fn load_from_file(path: &str) -> StoreResult<Self> {
        let store = Self::new(Some(path.to_string()));
        if Path::new(path).exists() {
            let reader = BufReader::new(File::open(path)?);
            let snapshot: Snapshot = serde_json::from_reader(reader)?;

            for (address, utxos) in snapshot.utxos {
                store.inner.utxos.insert(address, utxos);
            }
            for record in snapshot.issuers {
                let seq = store.inner.issuer_seq.fetch_add(1, Ordering::Relaxed);
                store.inner.issuers.insert(record.token_id.clone(), (seq, record));
            }
            for utxo in snapshot.token_utxos {
                store.push_token_utxo(utxo);
            }
            tracing::info!(
                path,
                wallets = store.inner.utxos.len(),
                issuers = store.inner.issuers.len(),
                "Loaded store snapshot"
            );
        }
        Ok(store)
    }

    /// Write the snapshot file. No-op for a purely in-memory store.
    pub fn save_to_file(&self) -> StoreResult<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let utxos: BTreeMap<_, _> = self
            .inner
            .utxos
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();

        let mut issuers: Vec<_> = self.inner.issuers.iter().map(|r| r.value().clone()).collect();
        issuers.sort_by_key(|(seq, _)| *seq);
        let issuers: Vec<_> = issuers.into_iter().map(|(_, record)| record).collect();

        let token_utxos: Vec<_> = self
            .inner
            .token_utxos
            .iter()
            .flat_map(|r| r.value().clone())
            .collect();

        let snapshot = Snapshot {
            utxos,
            issuers,
            token_utxos,
        };
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, &snapshot)?;
        tracing::info!(
            path = %path,
            issuers = snapshot.issuers.len(),
            token_utxos = snapshot.token_utxos.len(),
            "Saved store snapshot"
        );
        Ok(())
    }

    fn push_token_utxo(&self, utxo: TokenUtxo) {
        self.inner
            .token_utxos
            .entry((utxo.holder_address.clone(), utxo.token_id.clone()))
            .or_default()
            .push(utxo);
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("wallets", &self.inner.utxos.len())
            .field("issuers", &self.inner.issuers.len())
            .field("snapshot_path", &self.snapshot_path)
            .finish()
    }
}

#[async_trait]
impl UtxoStore for MemoryStore {
    async fn list(&self, address: &str) -> StoreResult<Vec<Utxo>> {
        Ok(self
            .inner
            .utxos
            .get(address)
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }

    async fn insert_many(&self, address: &str, utxos: &[Utxo]) -> StoreResult<()> {
        let mut entry = self.inner.utxos.entry(address.to_string()).or_default();
        for utxo in utxos {
            if let Some(existing) = entry
                .iter_mut()
                .find(|u| u.is_outpoint(&utxo.tx_id, utxo.output_index))
            {
                *existing = utxo.clone();
            } else {
                entry.push(utxo.clone());
            }
        }
        Ok(())
    }

    async fn remove(&self, address: &str, tx_id: &str, output_index: u32) -> StoreResult<()> {
        if let Some(mut entry) = self.inner.utxos.get_mut(address) {
            entry.retain(|u| !u.is_outpoint(tx_id, output_index));
        }
        Ok(())
    }

    async fn update(&self, address: &str, utxo: &Utxo) -> StoreResult<()> {
        let mut entry = self
            .inner
            .utxos
            .get_mut(address)
            .ok_or_else(|| StoreError::NotFound(address.to_string()))?;
        let existing = entry
            .iter_mut()
            .find(|u| u.is_outpoint(&utxo.tx_id, utxo.output_index))
            .ok_or_else(|| StoreError::NotFound(format!("{}:{}", utxo.tx_id, utxo.output_index)))?;
        *existing = utxo.clone();
        Ok(())
    }

    async fn clear(&self, address: &str) -> StoreResult<()> {
        self.inner.utxos.remove(address);
        Ok(())
    }

    async fn replace_all(&self, address: &str, utxos: &[Utxo]) -> StoreResult<()> {
        self.inner.utxos.insert(address.to_string(), utxos.to_vec());
        Ok(())
    }
}

#[async_trait]
impl IssuerStore for MemoryStore {
    async fn insert(&self, record: IssuerRecord) -> StoreResult<()> {
        match self.inner.issuers.entry(record.token_id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(record.token_id)),
            Entry::Vacant(slot) => {
                let seq = self.inner.issuer_seq.fetch_add(1, Ordering::Relaxed);
                slot.insert((seq, record));
                Ok(())
            }
        }
    }

    async fn get(&self, token_id: &str) -> StoreResult<Option<IssuerRecord>> {
        Ok(self.inner.issuers.get(token_id).map(|r| r.value().1.clone()))
    }

    async fn update(&self, record: &IssuerRecord) -> StoreResult<()> {
        let mut entry = self
            .inner
            .issuers
            .get_mut(&record.token_id)
            .ok_or_else(|| StoreError::NotFound(record.token_id.clone()))?;
        entry.1 = record.clone();
        Ok(())
    }

    async fn list(&self, page_size: usize, page: usize) -> StoreResult<(Vec<IssuerRecord>, usize)> {
        let mut all: Vec<_> = self.inner.issuers.iter().map(|r| r.value().clone()).collect();
        all.sort_by_key(|(seq, _)| *seq);
        let total = all.len();
        let skip = page.saturating_sub(1).saturating_mul(page_size);
        let records = all
            .into_iter()
            .skip(skip)
            .take(page_size)
            .map(|(_, record)| record)
            .collect();
        Ok((records, total))
    }
}

#[async_trait]
impl TokenUtxoStore for MemoryStore {
    async fn list(&self, holder: &str, token_id: &str) -> StoreResult<Vec<TokenUtxo>> {
        Ok(self
            .inner
            .token_utxos
            .get(&(holder.to_string(), token_id.to_string()))
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }

    async fn insert_many(&self, utxos: &[TokenUtxo]) -> StoreResult<()> {
        for utxo in utxos {
            self.push_token_utxo(utxo.clone());
        }
        Ok(())
    }

    async fn remove(
        &self,
        holder: &str,
        token_id: &str,
        tx_id: &str,
        output_index: u32,
    ) -> StoreResult<()> {
        if let Some(mut entry) = self
            .inner
            .token_utxos
            .get_mut(&(holder.to_string(), token_id.to_string()))
        {
            entry.retain(|u| !(u.tx_id == tx_id && u.output_index == output_index));
        }
        Ok(())
    }
}
