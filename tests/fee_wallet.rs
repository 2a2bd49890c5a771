//! Fee wallet pool behaviour against an in-memory chain.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use ft_relay::chain::transaction::plan_split;
use ft_relay::chain::types::{now_ms, ChainUnspent, GatewayError, Utxo};
use ft_relay::config::schema::PoolConfig;
use ft_relay::error::RelayError;
use ft_relay::store::{MemoryStore, StoreError, UtxoStore};
use ft_relay::wallet::{FeeWallet, SplitOutcome, SplitSkip};

mod common;
use common::{key, quiet_pool, FlakyStore, MockChain, Write};

const UNIT: u64 = 20_000;

async fn wallet(chain: &Arc<MockChain>, store: &MemoryStore, pool: PoolConfig, outputs: &[u64]) -> Arc<FeeWallet> {
    let fee_key = key(7);
    if !outputs.is_empty() {
        chain.fund(&fee_key, outputs);
    }
    let wallet = Arc::new(FeeWallet::new(
        fee_key,
        UNIT,
        0.5,
        pool,
        chain.clone(),
        Arc::new(store.clone()),
    ));
    wallet.sync().await.unwrap();
    wallet
}

async fn flaky_wallet(chain: &Arc<MockChain>, store: &FlakyStore, outputs: &[u64]) -> Arc<FeeWallet> {
    let fee_key = key(7);
    chain.fund(&fee_key, outputs);
    let wallet = Arc::new(FeeWallet::new(
        fee_key,
        UNIT,
        0.5,
        quiet_pool(),
        chain.clone(),
        Arc::new(store.clone()),
    ));
    wallet.sync().await.unwrap();
    wallet
}

fn outpoints(utxos: &[Utxo]) -> HashSet<(String, u32)> {
    utxos.iter().map(|u| (u.tx_id.clone(), u.output_index)).collect()
}

#[tokio::test]
async fn test_sync_keeps_persisted_metadata() {
    let chain = MockChain::new();
    let store = MemoryStore::new(None);
    let fee_key = key(7);
    let address = fee_key.address_string();

    let mut known = Utxo::new("aa".repeat(32), 0, 5_000);
    known.backoff_count = 2;
    known.eligible_after_ms = 42;
    let stale = Utxo::new("bb".repeat(32), 1, 7_000);
    store.insert_many(&address, &[known.clone(), stale]).await.unwrap();

    chain.set_unspents(
        &address,
        vec![
            ChainUnspent { tx_id: known.tx_id.clone(), output_index: 0, satoshis: 5_000 },
            ChainUnspent { tx_id: "cc".repeat(32), output_index: 3, satoshis: 9_000 },
        ],
    );

    let wallet = Arc::new(FeeWallet::new(
        fee_key,
        UNIT,
        0.5,
        quiet_pool(),
        chain.clone(),
        Arc::new(store.clone()),
    ));
    wallet.sync().await.unwrap();

    let pool = wallet.utxos();
    assert_eq!(pool.len(), 2);
    assert_eq!(wallet.balance(), 14_000);
    let kept = pool.iter().find(|u| u.tx_id == known.tx_id).unwrap();
    assert_eq!(kept.backoff_count, 2);
    assert_eq!(kept.eligible_after_ms, 42);
    assert!(pool.iter().all(|u| u.tx_id != "bb".repeat(32)));

    let persisted = store.list(&address).await.unwrap();
    assert_eq!(outpoints(&persisted), outpoints(&pool));
}

#[tokio::test]
async fn test_fetch_meets_target_or_takes_nothing() {
    let chain = MockChain::new();
    let store = MemoryStore::new(None);
    let wallet = wallet(&chain, &store, quiet_pool(), &[10_000, 8_000, 3_000, 500]).await;

    let picked = wallet.fetch(15_000);
    let sum: u64 = picked.iter().map(|u| u.satoshis).sum();
    assert!(sum >= 15_000);
    // largest first
    assert_eq!(picked.len(), 2);
    assert_eq!(wallet.pool_len(), 2);

    let none = wallet.fetch(1_000_000);
    assert!(none.is_empty());
    assert_eq!(wallet.pool_len(), 2);
}

#[tokio::test]
async fn test_dust_outputs_never_selected() {
    let chain = MockChain::new();
    let store = MemoryStore::new(None);
    let wallet = wallet(&chain, &store, quiet_pool(), &[546, 500, 300]).await;

    assert!(wallet.fetch(100).is_empty());
    assert_eq!(wallet.pool_len(), 3);
}

#[tokio::test]
async fn test_concurrent_reservations_never_share_outputs() {
    let chain = MockChain::new();
    let store = MemoryStore::new(None);
    let wallet = wallet(&chain, &store, quiet_pool(), &[5_000; 40]).await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let wallet = wallet.clone();
        handles.push(tokio::spawn(async move { wallet.fetch(9_000) }));
    }

    let mut claimed = Vec::new();
    for handle in handles {
        claimed.extend(handle.await.unwrap());
    }

    let unique = outpoints(&claimed);
    assert_eq!(unique.len(), claimed.len());
    assert_eq!(claimed.len(), 32);
    assert_eq!(wallet.pool_len(), 8);
    assert!(outpoints(&wallet.utxos()).is_disjoint(&unique));
}

#[tokio::test]
async fn test_recycle_is_idempotent() {
    let chain = MockChain::new();
    let store = MemoryStore::new(None);
    let wallet = wallet(&chain, &store, quiet_pool(), &[10_000, 10_000, 10_000]).await;

    let picked = wallet.fetch(15_000);
    assert_eq!(wallet.pool_len(), 1);

    wallet.recycle(picked.clone());
    wallet.recycle(picked);
    assert_eq!(wallet.pool_len(), 3);
    assert_eq!(wallet.balance(), 30_000);
}

#[tokio::test]
async fn test_successful_use_deletes_spent_outputs() {
    let chain = MockChain::new();
    let store = MemoryStore::new(None);
    let wallet = wallet(&chain, &store, quiet_pool(), &[10_000, 4_000]).await;
    let address = wallet.address().to_string();

    let spent = wallet
        .try_use_utxos(9_000, |utxos| async move { Ok(utxos) })
        .await
        .unwrap();

    assert_eq!(spent.len(), 1);
    assert_eq!(spent[0].satoshis, 10_000);
    assert_eq!(wallet.pool_len(), 1);
    let persisted = store.list(&address).await.unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].satoshis, 4_000);
}

#[tokio::test]
async fn test_failed_use_recycles_unchanged() {
    let chain = MockChain::new();
    let store = MemoryStore::new(None);
    let wallet = wallet(&chain, &store, quiet_pool(), &[10_000, 4_000]).await;

    let result: Result<(), _> = wallet
        .try_use_utxos(9_000, |_| async move {
            Err(RelayError::Gateway(GatewayError::Rejected("bad-txns".into())))
        })
        .await;

    assert!(matches!(result, Err(RelayError::Gateway(GatewayError::Rejected(_)))));
    assert_eq!(wallet.pool_len(), 2);
    assert!(wallet.utxos().iter().all(|u| u.backoff_count == 0));
}

#[tokio::test]
async fn test_empty_reservation_skips_operation() {
    let chain = MockChain::new();
    let store = MemoryStore::new(None);
    let wallet = wallet(&chain, &store, quiet_pool(), &[1_000]).await;

    let result: Result<(), _> = wallet
        .try_use_utxos(50_000, |_| async move { panic!("operation must not run") })
        .await;

    assert!(matches!(result, Err(RelayError::NoFundsAvailable { needed: 50_000 })));
    assert_eq!(wallet.pool_len(), 1);
}

#[tokio::test]
async fn test_chain_depth_rejection_backs_off_one_step() {
    let chain = MockChain::new();
    let store = MemoryStore::new(None);
    let pool = PoolConfig {
        backoff_cooldown_ms: 60_000,
        ..quiet_pool()
    };
    let wallet = wallet(&chain, &store, pool, &[10_000, 4_000]).await;
    let address = wallet.address().to_string();
    let before = now_ms();

    let result: Result<(), _> = wallet
        .try_use_utxos(9_000, |_| async move {
            Err(RelayError::Gateway(GatewayError::TooLongMempoolChain))
        })
        .await;
    assert!(matches!(result, Err(RelayError::UnconfirmedChainTooDeep)));

    let pool = wallet.utxos();
    assert_eq!(pool.len(), 2);
    let backed_off = pool.iter().find(|u| u.satoshis == 10_000).unwrap();
    assert_eq!(backed_off.backoff_count, 1);
    assert!(backed_off.eligible_after_ms >= before + 60_000);
    let untouched = pool.iter().find(|u| u.satoshis == 4_000).unwrap();
    assert_eq!(untouched.backoff_count, 0);

    let persisted = store.list(&address).await.unwrap();
    let stored = persisted.iter().find(|u| u.satoshis == 10_000).unwrap();
    assert_eq!(stored.backoff_count, 1);

    // Still in cooldown, so only the small output is eligible.
    assert!(wallet.fetch(9_000).is_empty());
    assert_eq!(wallet.status().backed_off_count, 1);
}

#[tokio::test]
async fn test_split_creates_unit_outputs() {
    let chain = MockChain::new();
    let store = MemoryStore::new(None);
    let value = 1_000_000;
    let wallet = wallet(&chain, &store, PoolConfig::default(), &[value]).await;
    let address = wallet.address().to_string();

    let outcome = wallet.adjust().await.unwrap();
    let plan = plan_split(value, UNIT, 0.5, 546, 500).unwrap();

    match outcome {
        SplitOutcome::Split { txid, outputs } => {
            assert_eq!(outputs, plan.total_outputs());
            assert_eq!(chain.broadcasts(), vec![txid.clone()]);
            let tx = chain.raw_tx(&txid).unwrap();
            assert_eq!(tx.output.len(), plan.total_outputs());
        }
        other => panic!("expected a split, got {:?}", other),
    }

    assert_eq!(wallet.pool_len(), plan.total_outputs());
    assert_eq!(wallet.balance(), value - plan.fee);
    let units = wallet.utxos().iter().filter(|u| u.satoshis == UNIT).count();
    assert_eq!(units, plan.unit_outputs);

    let persisted = store.list(&address).await.unwrap();
    assert_eq!(persisted.len(), plan.total_outputs());
}

#[tokio::test]
async fn test_split_skipped_above_low_water() {
    let chain = MockChain::new();
    let store = MemoryStore::new(None);
    let pool = PoolConfig {
        low_water_mark: 2,
        ..PoolConfig::default()
    };
    let wallet = wallet(&chain, &store, pool, &[500_000, 500_000, 500_000]).await;

    let outcome = wallet.adjust().await.unwrap();
    assert!(matches!(outcome, SplitOutcome::Skipped(SplitSkip::PoolHealthy)));
    assert!(chain.broadcasts().is_empty());
    assert_eq!(wallet.pool_len(), 3);
}

#[tokio::test]
async fn test_split_skipped_when_outputs_too_small() {
    let chain = MockChain::new();
    let store = MemoryStore::new(None);
    let wallet = wallet(&chain, &store, PoolConfig::default(), &[15_000, 12_000]).await;

    let outcome = wallet.adjust().await.unwrap();
    assert!(matches!(
        outcome,
        SplitOutcome::Skipped(SplitSkip::NothingToSplit { largest: 15_000 })
    ));
    assert_eq!(wallet.pool_len(), 2);
}

#[tokio::test]
async fn test_failed_split_restores_input() {
    let chain = MockChain::new();
    let store = MemoryStore::new(None);
    let wallet = wallet(&chain, &store, PoolConfig::default(), &[1_000_000]).await;
    chain.fail_next_broadcast(common::Fault::Rejected("mempool full".into()));

    assert!(wallet.adjust().await.is_err());
    assert_eq!(wallet.pool_len(), 1);
    assert_eq!(wallet.balance(), 1_000_000);
    assert!(!wallet.status().split_in_flight);
}

#[tokio::test]
async fn test_one_split_in_flight() {
    let chain = MockChain::new();
    let store = MemoryStore::new(None);
    let wallet = wallet(&chain, &store, PoolConfig::default(), &[1_000_000, 900_000]).await;
    chain.set_broadcast_delay(Duration::from_millis(50));

    let (first, second) = tokio::join!(wallet.adjust(), wallet.adjust());
    let outcomes = [first.unwrap(), second.unwrap()];

    let splits = outcomes
        .iter()
        .filter(|o| matches!(o, SplitOutcome::Split { .. }))
        .count();
    let busy = outcomes
        .iter()
        .filter(|o| matches!(o, SplitOutcome::Skipped(SplitSkip::AlreadyRunning)))
        .count();
    assert_eq!(splits, 1);
    assert_eq!(busy, 1);
    assert_eq!(chain.broadcasts().len(), 1);
}

#[tokio::test]
async fn test_sync_propagates_chain_failure() {
    let chain = MockChain::new();
    let store = MemoryStore::new(None);
    let wallet = wallet(&chain, &store, quiet_pool(), &[10_000, 20_000]).await;
    let address = wallet.address().to_string();
    chain.fund(&key(7), &[30_000]);

    chain.fail_next_query();
    let result = wallet.sync().await;

    assert!(matches!(
        result,
        Err(RelayError::Gateway(GatewayError::Rpc(ref msg))) if msg == "injected query failure"
    ));
    assert_eq!(wallet.pool_len(), 2);
    assert_eq!(wallet.balance(), 30_000);
    assert_eq!(store.list(&address).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_sync_propagates_store_failure() {
    let chain = MockChain::new();
    let store = FlakyStore::new(MemoryStore::new(None));
    let fee_key = key(7);
    chain.fund(&fee_key, &[10_000, 20_000]);
    let wallet = FeeWallet::new(
        fee_key,
        UNIT,
        0.5,
        quiet_pool(),
        chain.clone(),
        Arc::new(store.clone()),
    );

    store.fail(Write::UtxoReplace);
    let result = wallet.sync().await;

    assert!(matches!(
        result,
        Err(RelayError::Persistence(StoreError::Unavailable(_)))
    ));
    assert_eq!(wallet.pool_len(), 0);
    assert_eq!(wallet.balance(), 0);

    store.heal(Write::UtxoReplace);
    wallet.sync().await.unwrap();
    assert_eq!(wallet.pool_len(), 2);
}

#[tokio::test]
async fn test_cancelled_use_returns_outputs() {
    let chain = MockChain::new();
    let store = MemoryStore::new(None);
    let wallet = wallet(&chain, &store, quiet_pool(), &[50_000; 3]).await;
    let address = wallet.address().to_string();

    let result = tokio::time::timeout(
        Duration::from_millis(50),
        wallet.try_use_utxos(10_000, |_| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<(), RelayError>(())
        }),
    )
    .await;
    assert!(result.is_err());

    assert_eq!(wallet.pool_len(), 3);
    assert_eq!(wallet.balance(), 150_000);
    assert_eq!(store.list(&address).await.unwrap().len(), 3);
    assert_eq!(wallet.fetch(150_000).len(), 3);
}

#[tokio::test]
async fn test_dropped_pending_use_recycles_outputs() {
    let chain = MockChain::new();
    let store = MemoryStore::new(None);
    let wallet = wallet(&chain, &store, quiet_pool(), &[50_000; 2]).await;

    let mut pending = Box::pin(wallet.try_use_utxos(10_000, |_| async move {
        std::future::pending::<()>().await;
        Ok::<(), RelayError>(())
    }));
    // One poll reserves and parks inside the operation.
    assert!(poll_once(pending.as_mut()).await.is_none());
    assert_eq!(wallet.pool_len(), 1);

    drop(pending);
    assert_eq!(wallet.pool_len(), 2);
    assert_eq!(wallet.balance(), 100_000);
}

async fn poll_once<F: std::future::Future + Unpin>(fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        out = fut => Some(out),
        _ = std::future::ready(()) => None,
    }
}

#[tokio::test]
async fn test_spent_delete_failure_is_reported() {
    let chain = MockChain::new();
    let store = FlakyStore::new(MemoryStore::new(None));
    let wallet = flaky_wallet(&chain, &store, &[50_000, 40_000]).await;
    let address = wallet.address().to_string();

    store.fail(Write::UtxoRemove);
    let result = wallet.try_use_utxos(45_000, |_| async move { Ok(7u32) }).await;

    assert!(matches!(result, Err(RelayError::Persistence(_))));
    // Spent, so not recycled.
    assert_eq!(wallet.pool_len(), 1);
    assert_eq!(wallet.balance(), 40_000);
    assert_eq!(store.inner.list(&address).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_persistence_error_settles_outputs_as_spent() {
    let chain = MockChain::new();
    let store = FlakyStore::new(MemoryStore::new(None));
    let wallet = flaky_wallet(&chain, &store, &[50_000, 40_000]).await;
    let address = wallet.address().to_string();

    let result: Result<(), _> = wallet
        .try_use_utxos(45_000, |_| async move {
            Err(RelayError::Persistence(StoreError::Unavailable("down".into())))
        })
        .await;

    assert!(matches!(result, Err(RelayError::Persistence(StoreError::Unavailable(_)))));
    assert_eq!(wallet.pool_len(), 1);
    let persisted = store.inner.list(&address).await.unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].satoshis, 40_000);
}

#[tokio::test]
async fn test_backoff_persist_failure_is_reported() {
    let chain = MockChain::new();
    let store = FlakyStore::new(MemoryStore::new(None));
    let wallet = flaky_wallet(&chain, &store, &[50_000]).await;

    store.fail(Write::UtxoUpdate);
    let result: Result<(), _> = wallet
        .try_use_utxos(10_000, |_| async move {
            Err(RelayError::Gateway(GatewayError::TooLongMempoolChain))
        })
        .await;

    assert!(matches!(result, Err(RelayError::Persistence(_))));
    let pool = wallet.utxos();
    assert_eq!(pool.len(), 1);
    assert_eq!(pool[0].backoff_count, 1);
}
