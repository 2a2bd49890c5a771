//! Transaction decoding, signing and fee-wallet split construction.
//!
//! # Responsibilities
//! - Decode builder templates and re-encode signed transactions
//! - Compute FORKID signature digests and unlock inputs
//! - Estimate P2PKH transaction sizes for fee calculation
//! - Plan and build the self-pay split transaction used by auto-split

use bitcoin::absolute::LockTime;
use bitcoin::consensus::{deserialize, serialize, Encodable};
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::keys::SigningKey;
use crate::chain::types::Utxo;

pub const SIGHASH_ALL: u32 = 0x01;
pub const SIGHASH_NONE: u32 = 0x02;
pub const SIGHASH_SINGLE: u32 = 0x03;
pub const SIGHASH_FORKID: u32 = 0x40;
pub const SIGHASH_ANYONECANPAY: u32 = 0x80;

/// Default sighash for wallet-built transactions.
pub const SIGHASH_ALL_FORKID: u32 = SIGHASH_ALL | SIGHASH_FORKID;

/// Worst-case overhead of version, locktime and the two count varints.
const TX_OVERHEAD_BYTES: usize = 26;
/// Signed P2PKH input upper bound.
const P2PKH_INPUT_BYTES: usize = 148;
/// P2PKH output (value + varint + 25-byte script).
const P2PKH_OUTPUT_BYTES: usize = 34;

/// Errors raised while building or signing transactions.
#[derive(Debug, Error)]
pub enum TxError {
    #[error("Malformed transaction: {0}")]
    Decode(String),

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Template mismatch: {0}")]
    Template(String),

    #[error("Unsupported sighash type {0:#x}")]
    UnsupportedSighash(u32),

    #[error("Script error: {0}")]
    Script(String),
}

pub type TxResult<T> = Result<T, TxError>;

/// The output spent by a template input, index-aligned with the inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prevout {
    pub satoshis: u64,
    /// Locking script hex.
    pub script: String,
}

impl Prevout {
    fn script_buf(&self) -> TxResult<ScriptBuf> {
        let bytes = hex::decode(&self.script)
            .map_err(|e| TxError::Script(format!("invalid prevout script hex: {}", e)))?;
        Ok(ScriptBuf::from_bytes(bytes))
    }
}

/// A fully signed transaction ready for broadcast.
#[derive(Debug, Clone)]
pub struct SignedTx {
    pub tx: Transaction,
    pub hex: String,
    pub txid: String,
}

impl SignedTx {
    pub fn from_tx(tx: Transaction) -> Self {
        let hex = hex::encode(serialize(&tx));
        let txid = tx.compute_txid().to_string();
        Self { tx, hex, txid }
    }

    /// Index, value and script of the last output, where builders place fee change.
    pub fn trailing_output(&self) -> Option<(u32, u64, &ScriptBuf)> {
        let index = self.tx.output.len().checked_sub(1)?;
        let out = &self.tx.output[index];
        Some((index as u32, out.value.to_sat(), &out.script_pubkey))
    }

    pub fn output(&self, index: usize) -> Option<&TxOut> {
        self.tx.output.get(index)
    }
}

/// Decode a hex-encoded transaction.
pub fn decode_tx(raw_hex: &str) -> TxResult<Transaction> {
    let bytes = hex::decode(raw_hex.trim()).map_err(|e| TxError::Decode(e.to_string()))?;
    deserialize(&bytes).map_err(|e| TxError::Decode(e.to_string()))
}

/// Estimated serialized size of a P2PKH-only transaction.
pub fn estimate_p2pkh_size(inputs: usize, outputs: usize) -> usize {
    TX_OVERHEAD_BYTES + inputs * P2PKH_INPUT_BYTES + outputs * P2PKH_OUTPUT_BYTES
}

/// Fee for `bytes` at `fee_rate` sat/byte, rounded up.
pub fn fee_for_size(bytes: usize, fee_rate: f64) -> u64 {
    (bytes as f64 * fee_rate).ceil() as u64
}

fn encode_into<T: Encodable + ?Sized>(value: &T, buf: &mut Vec<u8>) -> TxResult<()> {
    value
        .consensus_encode(buf)
        .map(|_| ())
        .map_err(|e| TxError::Encode(e.to_string()))
}

/// FORKID signature digest (BIP143 preimage layout) for one input.
pub fn forkid_sighash(
    tx: &Transaction,
    input_index: usize,
    script_code: &ScriptBuf,
    value: u64,
    sighash_type: u32,
) -> TxResult<[u8; 32]> {
    if sighash_type & SIGHASH_FORKID == 0 {
        return Err(TxError::UnsupportedSighash(sighash_type));
    }
    let input = tx.input.get(input_index).ok_or_else(|| {
        TxError::Template(format!("input index {} out of range", input_index))
    })?;

    let base = sighash_type & 0x1f;
    let anyone_can_pay = sighash_type & SIGHASH_ANYONECANPAY != 0;
    let zero = [0u8; 32];

    let hash_prevouts = if anyone_can_pay {
        zero
    } else {
        let mut buf = Vec::with_capacity(tx.input.len() * 36);
        for txin in &tx.input {
            encode_into(&txin.previous_output, &mut buf)?;
        }
        sha256d::Hash::hash(&buf).to_byte_array()
    };

    let hash_sequence = if anyone_can_pay || base == SIGHASH_SINGLE || base == SIGHASH_NONE {
        zero
    } else {
        let mut buf = Vec::with_capacity(tx.input.len() * 4);
        for txin in &tx.input {
            encode_into(&txin.sequence, &mut buf)?;
        }
        sha256d::Hash::hash(&buf).to_byte_array()
    };

    let hash_outputs = if base != SIGHASH_SINGLE && base != SIGHASH_NONE {
        let mut buf = Vec::new();
        for out in &tx.output {
            encode_into(out, &mut buf)?;
        }
        sha256d::Hash::hash(&buf).to_byte_array()
    } else if base == SIGHASH_SINGLE && input_index < tx.output.len() {
        let mut buf = Vec::new();
        encode_into(&tx.output[input_index], &mut buf)?;
        sha256d::Hash::hash(&buf).to_byte_array()
    } else {
        zero
    };

    let mut preimage = Vec::with_capacity(160 + script_code.len());
    encode_into(&tx.version, &mut preimage)?;
    preimage.extend_from_slice(&hash_prevouts);
    preimage.extend_from_slice(&hash_sequence);
    encode_into(&input.previous_output, &mut preimage)?;
    encode_into(script_code, &mut preimage)?;
    preimage.extend_from_slice(&value.to_le_bytes());
    encode_into(&input.sequence, &mut preimage)?;
    preimage.extend_from_slice(&hash_outputs);
    encode_into(&tx.lock_time, &mut preimage)?;
    preimage.extend_from_slice(&sighash_type.to_le_bytes());

    Ok(sha256d::Hash::hash(&preimage).to_byte_array())
}

fn signature_push(
    tx: &Transaction,
    input_index: usize,
    key: &SigningKey,
    script_code: &ScriptBuf,
    value: u64,
    sighash_type: u32,
) -> TxResult<PushBytesBuf> {
    let digest = forkid_sighash(tx, input_index, script_code, value, sighash_type)?;
    let mut sig = key.sign_digest(digest);
    sig.push((sighash_type & 0xff) as u8);
    PushBytesBuf::try_from(sig).map_err(|e| TxError::Script(e.to_string()))
}

/// Standard `<sig> <pubkey>` unlocking script for a P2PKH input.
pub fn p2pkh_unlocking_script(
    tx: &Transaction,
    input_index: usize,
    key: &SigningKey,
    prevout_script: &ScriptBuf,
    value: u64,
    sighash_type: u32,
) -> TxResult<ScriptBuf> {
    let sig = signature_push(tx, input_index, key, prevout_script, value, sighash_type)?;
    Ok(Builder::new()
        .push_slice(sig)
        .push_key(key.public_key())
        .into_script())
}

/// Sign an unsigned builder template.
///
/// P2PKH prevouts paying `fee_key` or `owner_key` get a full P2PKH unlock.
/// Every other prevout is a contract input: the owner's `<sig> <pubkey>` is
/// appended to the unlocking data the builder already placed there.
pub fn sign_template(
    raw_hex: &str,
    prevouts: &[Prevout],
    sighash_type: u32,
    fee_key: &SigningKey,
    owner_key: &SigningKey,
) -> TxResult<SignedTx> {
    let mut tx = decode_tx(raw_hex)?;
    if prevouts.len() != tx.input.len() {
        return Err(TxError::Template(format!(
            "{} prevouts for {} inputs",
            prevouts.len(),
            tx.input.len()
        )));
    }

    let fee_script = fee_key.p2pkh_script();
    let owner_script = owner_key.p2pkh_script();

    let mut unlocks = Vec::with_capacity(tx.input.len());
    for (index, prevout) in prevouts.iter().enumerate() {
        let script = prevout.script_buf()?;
        let unlock = if script == fee_script {
            p2pkh_unlocking_script(&tx, index, fee_key, &script, prevout.satoshis, sighash_type)?
        } else if script == owner_script {
            p2pkh_unlocking_script(&tx, index, owner_key, &script, prevout.satoshis, sighash_type)?
        } else {
            let sig =
                signature_push(&tx, index, owner_key, &script, prevout.satoshis, sighash_type)?;
            Builder::from(tx.input[index].script_sig.to_bytes())
                .push_slice(sig)
                .push_key(owner_key.public_key())
                .into_script()
        };
        unlocks.push(unlock);
    }

    for (input, unlock) in tx.input.iter_mut().zip(unlocks) {
        input.script_sig = unlock;
    }

    Ok(SignedTx::from_tx(tx))
}

/// Output layout for an auto-split transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPlan {
    pub unit_outputs: usize,
    pub unit_satoshis: u64,
    pub change: u64,
    pub fee: u64,
}

impl SplitPlan {
    pub fn total_outputs(&self) -> usize {
        self.unit_outputs + 1
    }
}

/// Plan how to split `value` into `unit` outputs plus a mandatory change.
///
/// Stops adding unit outputs once the remainder could no longer pay the fee
/// and leave a dust-sized change. Returns `None` if not even one unit fits.
pub fn plan_split(
    value: u64,
    unit: u64,
    fee_rate: f64,
    dust: u64,
    max_outputs: usize,
) -> Option<SplitPlan> {
    let fee_with = |outputs: usize| fee_for_size(estimate_p2pkh_size(1, outputs), fee_rate).max(dust);

    let mut left = value;
    let mut count = 0usize;
    while count < max_outputs {
        let Some(next_left) = left.checked_sub(unit) else {
            break;
        };
        // count + 1 unit outputs plus the change output
        if next_left < fee_with(count + 2).saturating_add(dust) {
            break;
        }
        left = next_left;
        count += 1;
    }

    if count == 0 {
        return None;
    }

    let fee = fee_with(count + 1);
    Some(SplitPlan {
        unit_outputs: count,
        unit_satoshis: unit,
        change: left - fee,
        fee,
    })
}

/// Build and sign the self-pay split transaction spending `input`.
pub fn build_split_tx(input: &Utxo, plan: &SplitPlan, key: &SigningKey) -> TxResult<SignedTx> {
    let txid: Txid = input
        .tx_id
        .parse()
        .map_err(|e| TxError::Decode(format!("invalid txid '{}': {}", input.tx_id, e)))?;
    let script = key.p2pkh_script();

    let mut output: Vec<TxOut> = (0..plan.unit_outputs)
        .map(|_| TxOut {
            value: Amount::from_sat(plan.unit_satoshis),
            script_pubkey: script.clone(),
        })
        .collect();
    output.push(TxOut {
        value: Amount::from_sat(plan.change),
        script_pubkey: script.clone(),
    });

    let mut tx = Transaction {
        version: Version::ONE,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::new(txid, input.output_index),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::default(),
        }],
        output,
    };

    let unlock = p2pkh_unlocking_script(&tx, 0, key, &script, input.satoshis, SIGHASH_ALL_FORKID)?;
    tx.input[0].script_sig = unlock;

    Ok(SignedTx::from_tx(tx))
}
