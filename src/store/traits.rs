//! Store interfaces consumed by the wallet and orchestrator.

use async_trait::async_trait;
use thiserror::Error;

use crate::chain::types::Utxo;
use crate::token::types::{IssuerRecord, TokenUtxo};

/// Errors surfaced by a persistence backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Snapshot file could not be read or written.
    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot contents could not be (de)serialized.
    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Insert of a key that already exists.
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Update or removal of a key that does not exist.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Backend unavailable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Fee wallet outputs, keyed by wallet address.
#[async_trait]
pub trait UtxoStore: Send + Sync {
    async fn list(&self, address: &str) -> StoreResult<Vec<Utxo>>;

    async fn insert_many(&self, address: &str, utxos: &[Utxo]) -> StoreResult<()>;

    /// Delete one output. Missing outputs are ignored.
    async fn remove(&self, address: &str, tx_id: &str, output_index: u32) -> StoreResult<()>;

    /// Overwrite the selection metadata of an existing output.
    async fn update(&self, address: &str, utxo: &Utxo) -> StoreResult<()>;

    async fn clear(&self, address: &str) -> StoreResult<()>;

    /// Replace every output of `address`.
    async fn replace_all(&self, address: &str, utxos: &[Utxo]) -> StoreResult<()> {
        self.clear(address).await?;
        self.insert_many(address, utxos).await
    }
}

/// Issuance contract state, keyed by token id.
#[async_trait]
pub trait IssuerStore: Send + Sync {
    async fn insert(&self, record: IssuerRecord) -> StoreResult<()>;

    async fn get(&self, token_id: &str) -> StoreResult<Option<IssuerRecord>>;

    async fn update(&self, record: &IssuerRecord) -> StoreResult<()>;

    /// One page (1-based) in creation order, with the total record count.
    async fn list(&self, page_size: usize, page: usize) -> StoreResult<(Vec<IssuerRecord>, usize)>;
}

/// Token outputs, keyed by holder address and token id.
#[async_trait]
pub trait TokenUtxoStore: Send + Sync {
    /// Outputs of `token_id` held by `holder`, in insertion order.
    async fn list(&self, holder: &str, token_id: &str) -> StoreResult<Vec<TokenUtxo>>;

    async fn insert_many(&self, utxos: &[TokenUtxo]) -> StoreResult<()>;

    /// Delete one output. Missing outputs are ignored.
    async fn remove(
        &self,
        holder: &str,
        token_id: &str,
        tx_id: &str,
        output_index: u32,
    ) -> StoreResult<()>;
}
