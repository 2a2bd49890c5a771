//! Token API handlers.
//!
//! Request bodies carry WIF keys; their `Debug` impls redact them so they
//! never reach the logs.

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::chain::keys::SigningKey;
use crate::error::RelayError;
use crate::http::response::{ApiResponse, ApiResult};
use crate::http::server::AppState;
use crate::token::types::{IssuerPage, TokenAmount, TokenBalance, TokenReceiver};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenesisBody {
    pub genesis_wif: String,
    pub token_name: String,
    pub token_symbol: String,
    pub decimal_num: u8,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueBody {
    pub genesis_wif: String,
    pub genesis_id: String,
    pub token_amount: TokenAmount,
    pub receiver_address: String,
    pub allow_increase_issues: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferBody {
    pub genesis_id: String,
    pub sender_wif: String,
    pub receivers: Vec<TokenReceiver>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeBody {
    pub genesis_id: String,
    pub sender_wif: String,
}

impl std::fmt::Debug for GenesisBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenesisBody")
            .field("genesis_wif", &"[REDACTED]")
            .field("token_name", &self.token_name)
            .field("token_symbol", &self.token_symbol)
            .field("decimal_num", &self.decimal_num)
            .finish()
    }
}

impl std::fmt::Debug for IssueBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssueBody")
            .field("genesis_wif", &"[REDACTED]")
            .field("genesis_id", &self.genesis_id)
            .field("token_amount", &self.token_amount)
            .field("receiver_address", &self.receiver_address)
            .field("allow_increase_issues", &self.allow_increase_issues)
            .finish()
    }
}

impl std::fmt::Debug for TransferBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferBody")
            .field("genesis_id", &self.genesis_id)
            .field("sender_wif", &"[REDACTED]")
            .field("receivers", &self.receivers)
            .finish()
    }
}

impl std::fmt::Debug for MergeBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeBody")
            .field("genesis_id", &self.genesis_id)
            .field("sender_wif", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenesisReply {
    pub genesis_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReply {
    pub tx_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueListQuery {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_current_page")]
    pub current_page: usize,
}

fn default_page_size() -> usize {
    10
}

fn default_current_page() -> usize {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceQuery {
    pub genesis_id: String,
    pub address: String,
}

pub async fn genesis(
    State(state): State<AppState>,
    payload: Result<Json<GenesisBody>, JsonRejection>,
) -> ApiResult<GenesisReply> {
    let Json(body) = payload?;
    let issuer = SigningKey::from_wif(&body.genesis_wif, state.orchestrator.network())
        .map_err(RelayError::from)?;

    let genesis_id = state
        .orchestrator
        .genesis(&issuer, &body.token_name, &body.token_symbol, body.decimal_num)
        .await?;
    Ok(ApiResponse::ok(GenesisReply { genesis_id }))
}

pub async fn issue(
    State(state): State<AppState>,
    payload: Result<Json<IssueBody>, JsonRejection>,
) -> ApiResult<TxReply> {
    let Json(body) = payload?;
    let issuer = SigningKey::from_wif(&body.genesis_wif, state.orchestrator.network())
        .map_err(RelayError::from)?;

    let tx_id = state
        .orchestrator
        .issue(
            &issuer,
            &body.genesis_id,
            body.token_amount,
            &body.receiver_address,
            body.allow_increase_issues,
        )
        .await?;
    Ok(ApiResponse::ok(TxReply { tx_id }))
}

pub async fn transfer(
    State(state): State<AppState>,
    payload: Result<Json<TransferBody>, JsonRejection>,
) -> ApiResult<TxReply> {
    let Json(body) = payload?;
    let sender = SigningKey::from_wif(&body.sender_wif, state.orchestrator.network())
        .map_err(RelayError::from)?;

    let tx_id = state
        .orchestrator
        .transfer(&body.genesis_id, &sender, &body.receivers)
        .await?;
    Ok(ApiResponse::ok(TxReply { tx_id }))
}

pub async fn merge(
    State(state): State<AppState>,
    payload: Result<Json<MergeBody>, JsonRejection>,
) -> ApiResult<TxReply> {
    let Json(body) = payload?;
    let sender = SigningKey::from_wif(&body.sender_wif, state.orchestrator.network())
        .map_err(RelayError::from)?;

    let tx_id = state.orchestrator.merge(&body.genesis_id, &sender).await?;
    Ok(ApiResponse::ok(TxReply { tx_id }))
}

pub async fn query_issue_list(
    State(state): State<AppState>,
    query: Result<Query<IssueListQuery>, QueryRejection>,
) -> ApiResult<IssuerPage> {
    let Query(query) = query?;
    let page = state
        .orchestrator
        .list_issuers(query.page_size, query.current_page)
        .await?;
    Ok(ApiResponse::ok(page))
}

pub async fn query_address_balance(
    State(state): State<AppState>,
    query: Result<Query<BalanceQuery>, QueryRejection>,
) -> ApiResult<TokenBalance> {
    let Query(query) = query?;
    let balance = state
        .orchestrator
        .token_balance(&query.genesis_id, &query.address)
        .await?;
    Ok(ApiResponse::ok(balance))
}
