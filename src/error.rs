//! Relay-level error taxonomy.
//!
//! Subsystem errors are folded into [`RelayError`], which carries the
//! retry classification and stable numeric code exposed over the API.

use thiserror::Error;

use crate::builder::BuilderError;
use crate::chain::keys::KeyError;
use crate::chain::transaction::TxError;
use crate::chain::types::GatewayError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),

    /// No eligible fee outputs cover the estimate right now.
    #[error("No fee outputs available for {needed} satoshis")]
    NoFundsAvailable { needed: u64 },

    /// The network refused a spend for unconfirmed-ancestor depth; the inputs were backed off.
    #[error("Unconfirmed chain too deep; retry after confirmations")]
    UnconfirmedChainTooDeep,

    #[error("Insufficient token balance: have {available}, need {requested}")]
    InsufficientTokenBalance { available: u128, requested: u128 },

    #[error("Unsupported transfer shape: {inputs} inputs to {outputs} outputs")]
    UnsupportedShape { inputs: usize, outputs: usize },

    /// Too many inputs for one transfer; a merge was attempted.
    #[error("Too many token inputs ({0}); outputs are being merged, retry later")]
    TooManyTokenInputs(usize),

    #[error("Protocol builder rejected {route}: code {code} {msg}")]
    ProtocolBuilder { route: String, code: i64, msg: String },

    #[error("Protocol builder unavailable: {0}")]
    BuilderUnavailable(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Token not found: {0}")]
    TokenNotFound(String),

    #[error("Issuance closed for token {0}")]
    IssuanceClosed(String),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Transaction(#[from] TxError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

pub type RelayResult<T> = Result<T, RelayError>;

impl From<BuilderError> for RelayError {
    fn from(err: BuilderError) -> Self {
        match err {
            BuilderError::Rejected { route, code, msg } => {
                RelayError::ProtocolBuilder { route, code, msg }
            }
            other => RelayError::BuilderUnavailable(other.to_string()),
        }
    }
}

impl RelayError {
    /// Whether the same request may succeed if retried later.
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayError::NoFundsAvailable { .. }
            | RelayError::UnconfirmedChainTooDeep
            | RelayError::TooManyTokenInputs(_)
            | RelayError::BuilderUnavailable(_) => true,
            RelayError::Gateway(e) => matches!(
                e,
                GatewayError::Rpc(_) | GatewayError::Timeout(_) | GatewayError::TooLongMempoolChain
            ),
            _ => false,
        }
    }

    /// Stable numeric code returned to API clients.
    pub fn code(&self) -> u32 {
        match self {
            RelayError::InvalidRequest(_) => 1001,
            RelayError::Key(_) => 1002,
            RelayError::TokenNotFound(_) => 1003,
            RelayError::IssuanceClosed(_) => 1004,
            RelayError::InsufficientTokenBalance { .. } => 1005,
            RelayError::UnsupportedShape { .. } => 1006,
            RelayError::NoFundsAvailable { .. } => 2001,
            RelayError::UnconfirmedChainTooDeep => 2002,
            RelayError::TooManyTokenInputs(_) => 2003,
            RelayError::ProtocolBuilder { .. } => 3001,
            RelayError::BuilderUnavailable(_) => 3002,
            RelayError::Gateway(_) => 3003,
            RelayError::Transaction(_) => 4001,
            RelayError::Persistence(_) => 4002,
        }
    }

    /// Label used in metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Persistence(_) => "persistence",
            RelayError::NoFundsAvailable { .. } => "no_funds",
            RelayError::UnconfirmedChainTooDeep => "chain_too_deep",
            RelayError::InsufficientTokenBalance { .. } => "insufficient_tokens",
            RelayError::UnsupportedShape { .. } => "unsupported_shape",
            RelayError::TooManyTokenInputs(_) => "too_many_inputs",
            RelayError::ProtocolBuilder { .. } => "builder_rejected",
            RelayError::BuilderUnavailable(_) => "builder_unavailable",
            RelayError::Gateway(_) => "gateway",
            RelayError::TokenNotFound(_) => "token_not_found",
            RelayError::IssuanceClosed(_) => "issuance_closed",
            RelayError::Key(_) => "key",
            RelayError::Transaction(_) => "transaction",
            RelayError::InvalidRequest(_) => "invalid_request",
        }
    }
}
