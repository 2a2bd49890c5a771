//! Token domain types shared by the orchestrator, stores and builder.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A token quantity. Serialized as a decimal string so values beyond 2^53 survive JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TokenAmount(pub u128);

impl TokenAmount {
    pub const ZERO: TokenAmount = TokenAmount(0);

    pub fn checked_add(self, other: TokenAmount) -> Option<TokenAmount> {
        self.0.checked_add(other.0).map(TokenAmount)
    }

    pub fn checked_sub(self, other: TokenAmount) -> Option<TokenAmount> {
        self.0.checked_sub(other.0).map(TokenAmount)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl From<u128> for TokenAmount {
    fn from(v: u128) -> Self {
        TokenAmount(v)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

struct TokenAmountVisitor;

impl<'de> Visitor<'de> for TokenAmountVisitor {
    type Value = TokenAmount;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative integer or decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<TokenAmount, E> {
        Ok(TokenAmount(v as u128))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<TokenAmount, E> {
        u128::try_from(v)
            .map(TokenAmount)
            .map_err(|_| E::custom("token amount must not be negative"))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<TokenAmount, E> {
        Ok(TokenAmount(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<TokenAmount, E> {
        v.trim()
            .parse::<u128>()
            .map(TokenAmount)
            .map_err(|_| E::custom(format!("invalid token amount '{}'", v)))
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TokenAmountVisitor)
    }
}

/// One requested transfer output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenReceiver {
    pub address: String,
    pub amount: TokenAmount,
}

/// A token output held by `holder_address`.
///
/// The predecessor fields chain each output back to the output it was
/// created from; the on-chain contract checks that chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUtxo {
    pub token_id: String,
    pub tx_id: String,
    pub output_index: u32,
    pub satoshis: u64,
    pub locking_script: String,
    pub holder_address: String,
    pub token_amount: TokenAmount,
    /// Raw hex of the transaction that created this output.
    pub raw_tx: String,
    pub predecessor_tx_id: String,
    pub predecessor_output_index: u32,
    pub predecessor_raw_tx: String,
    pub predecessor_holder_address: String,
    pub predecessor_token_amount: TokenAmount,
}

/// Current state output of a token's issuance contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerRecord {
    pub token_id: String,
    pub contract_tx_id: String,
    pub contract_output_index: u32,
    pub contract_raw_tx: String,
    pub predecessor_tx_id: String,
    pub predecessor_output_index: u32,
    pub predecessor_raw_tx: String,
    pub token_name: String,
    pub token_symbol: String,
    pub decimals: u8,
    /// False once a terminal issue consumed the contract output.
    #[serde(default = "default_reissuable")]
    pub reissuable: bool,
}

fn default_reissuable() -> bool {
    true
}

/// Public view of an issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSummary {
    pub token_id: String,
    pub token_name: String,
    pub token_symbol: String,
    pub decimal_num: u8,
}

impl From<&IssuerRecord> for IssuerSummary {
    fn from(r: &IssuerRecord) -> Self {
        Self {
            token_id: r.token_id.clone(),
            token_name: r.token_name.clone(),
            token_symbol: r.token_symbol.clone(),
            decimal_num: r.decimals,
        }
    }
}

/// One page of issued tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerPage {
    pub list: Vec<IssuerSummary>,
    pub page_size: usize,
    pub current: usize,
    pub total: usize,
}

/// Token holdings of one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub token_id: String,
    pub address: String,
    pub balance: TokenAmount,
    pub utxo_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_serializes_as_string() {
        let amount = TokenAmount(u128::MAX);
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, format!("\"{}\"", u128::MAX));
        let back: TokenAmount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);
    }

    #[test]
    fn test_amount_accepts_plain_number() {
        let amount: TokenAmount = serde_json::from_str("1500").unwrap();
        assert_eq!(amount, TokenAmount(1500));
        assert!(serde_json::from_str::<TokenAmount>("-1").is_err());
        assert!(serde_json::from_str::<TokenAmount>("\"abc\"").is_err());
    }

    #[test]
    fn test_issuer_record_defaults_reissuable() {
        let json = r#"{
            "tokenId":"t","contractTxId":"c","contractOutputIndex":0,"contractRawTx":"",
            "predecessorTxId":"p","predecessorOutputIndex":1,"predecessorRawTx":"",
            "tokenName":"N","tokenSymbol":"S","decimals":2
        }"#;
        let record: IssuerRecord = serde_json::from_str(json).unwrap();
        assert!(record.reissuable);
        assert_eq!(IssuerSummary::from(&record).decimal_num, 2);
    }
}
