//! The in-memory set of spendable fee outputs.

use parking_lot::Mutex;
use std::cmp::Reverse;

use crate::chain::types::Utxo;

/// Selection limits applied by [`UtxoPool::reserve`].
#[derive(Debug, Clone, Copy)]
pub struct SelectionLimits {
    /// Outputs at or below this value are skipped.
    pub dust: u64,
    /// Most candidates examined before giving up.
    pub max_attempts: usize,
}

/// Fee outputs not currently claimed by any reservation.
///
/// Every mutation happens under one mutex that is never held across an
/// await, so selecting and removing an output is a single atomic step.
#[derive(Debug, Default)]
pub struct UtxoPool {
    utxos: Mutex<Vec<Utxo>>,
}

impl UtxoPool {
    pub fn new(utxos: Vec<Utxo>) -> Self {
        Self {
            utxos: Mutex::new(utxos),
        }
    }

    pub fn replace(&self, utxos: Vec<Utxo>) {
        *self.utxos.lock() = utxos;
    }

    pub fn len(&self) -> usize {
        self.utxos.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.lock().is_empty()
    }

    pub fn balance(&self) -> u64 {
        self.utxos.lock().iter().map(|u| u.satoshis).sum()
    }

    pub fn eligible_count(&self, now_ms: u64) -> usize {
        self.utxos.lock().iter().filter(|u| u.is_eligible(now_ms)).count()
    }

    pub fn backed_off_count(&self) -> usize {
        self.utxos.lock().iter().filter(|u| u.backoff_count > 0).count()
    }

    pub fn snapshot(&self) -> Vec<Utxo> {
        self.utxos.lock().clone()
    }

    /// Claim eligible outputs summing to at least `target`.
    ///
    /// Candidates are ordered by fewest back-offs, then largest value.
    /// Returns an empty vector and leaves the pool untouched if the target
    /// cannot be met within the limits.
    pub fn reserve(&self, target: u64, now_ms: u64, limits: SelectionLimits) -> Vec<Utxo> {
        let mut utxos = self.utxos.lock();

        let mut candidates: Vec<usize> = (0..utxos.len())
            .filter(|&i| utxos[i].is_eligible(now_ms))
            .collect();
        candidates.sort_by_key(|&i| (utxos[i].backoff_count, Reverse(utxos[i].satoshis)));

        let mut picked = Vec::new();
        let mut sum = 0u64;
        for (attempt, &i) in candidates.iter().enumerate() {
            if sum >= target || attempt >= limits.max_attempts {
                break;
            }
            if utxos[i].satoshis <= limits.dust {
                continue;
            }
            sum = sum.saturating_add(utxos[i].satoshis);
            picked.push(i);
        }

        if sum < target || picked.is_empty() {
            return Vec::new();
        }

        picked.sort_unstable_by(|a, b| b.cmp(a));
        let mut claimed: Vec<Utxo> = picked.into_iter().map(|i| utxos.remove(i)).collect();
        claimed.reverse();
        claimed
    }

    /// Claim the single largest output if the pool is below `low_water_mark`
    /// and that output is worth at least `min_value`.
    pub fn claim_largest(&self, low_water_mark: usize, min_value: u64) -> Result<Utxo, SplitSkip> {
        let mut utxos = self.utxos.lock();
        if utxos.len() >= low_water_mark {
            return Err(SplitSkip::PoolHealthy);
        }
        let (index, largest) = utxos
            .iter()
            .enumerate()
            .max_by_key(|(_, u)| u.satoshis)
            .ok_or(SplitSkip::Empty)?;
        if largest.satoshis < min_value {
            return Err(SplitSkip::NothingToSplit {
                largest: largest.satoshis,
            });
        }
        Ok(utxos.remove(index))
    }

    /// Return outputs to the pool. Outpoints already present are not duplicated.
    pub fn release(&self, returned: Vec<Utxo>) {
        let mut utxos = self.utxos.lock();
        for utxo in returned {
            if !utxos.iter().any(|u| u.is_outpoint(&utxo.tx_id, utxo.output_index)) {
                utxos.push(utxo);
            }
        }
    }
}

/// Why an auto-split did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitSkip {
    PoolHealthy,
    Empty,
    NothingToSplit { largest: u64 },
    AlreadyRunning,
}
