//! Protocol builder request/response types.
//!
//! Field names follow the builder's camelCase JSON contract.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::transaction::Prevout;
use crate::chain::types::{Network, Utxo};
use crate::token::route::RouteCheckShape;
use crate::token::types::{TokenAmount, TokenReceiver, TokenUtxo};

/// Errors surfaced by the protocol builder.
#[derive(Debug, Error)]
pub enum BuilderError {
    /// Connection failure or non-JSON response.
    #[error("Builder transport error: {0}")]
    Transport(String),

    /// Builder request timed out.
    #[error("Builder timeout after {0} seconds")]
    Timeout(u64),

    /// Builder answered with a non-zero code.
    #[error("Builder rejected {route}: code {code} {msg}")]
    Rejected { route: String, code: i64, msg: String },

    /// Reply was code 0 but carried no template.
    #[error("Builder reply for {0} had no data")]
    EmptyReply(String),
}

pub type BuilderResult<T> = Result<T, BuilderError>;

/// Reply envelope shared by every builder route.
#[derive(Debug, Deserialize)]
pub struct BuilderReply<T> {
    pub code: i64,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub msg: String,
}

/// An unsigned transaction template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxTemplate {
    /// Unsigned transaction hex.
    pub raw: String,
    /// Outputs spent by each input, in input order.
    #[serde(rename = "outputs")]
    pub prevouts: Vec<Prevout>,
    /// Sighash type to sign every input with.
    pub sigtype: u32,
}

/// Fee payment context shared by every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeInputs {
    pub utxos: Vec<Utxo>,
    /// Fee wallet address; change is paid here as the last output.
    pub utxo_address: String,
    pub feeb: f64,
    pub network: Network,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenesisRequest {
    pub issuer_pk: String,
    pub token_name: String,
    pub token_symbol: String,
    pub decimal_num: u8,
    #[serde(flatten)]
    pub fee: FeeInputs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRequest {
    pub genesis_tx_id: String,
    pub genesis_output_index: u32,
    pub pre_utxo_tx_id: String,
    pub pre_utxo_output_index: u32,
    pub pre_utxo_tx_hex: String,
    pub spend_by_tx_id: String,
    pub spend_by_output_index: u32,
    pub spend_by_tx_hex: String,
    pub issuer_pk: String,
    pub receiver_address: String,
    pub token_amount: TokenAmount,
    pub allow_increase_issues: bool,
    #[serde(flatten)]
    pub fee: FeeInputs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteCheckRequest {
    pub sender_pk: String,
    pub receivers: Vec<TokenReceiver>,
    pub ft_utxos: Vec<TokenUtxo>,
    pub route_check_type: RouteCheckShape,
    #[serde(flatten)]
    pub fee: FeeInputs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub sender_pk: String,
    pub receivers: Vec<TokenReceiver>,
    pub ft_utxos: Vec<TokenUtxo>,
    pub route_check_type: RouteCheckShape,
    /// Signed route-check transaction from phase 1.
    pub route_check_hex: String,
    #[serde(flatten)]
    pub fee: FeeInputs,
}
