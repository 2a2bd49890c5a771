use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by [`FtClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The relay answered with an error envelope.
    #[error("Relay error {code} (HTTP {status}): {message}")]
    Api {
        status: u16,
        code: u32,
        message: String,
        retryable: bool,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response (HTTP {status}): {body}")]
    Decode { status: u16, body: String },
}

impl ClientError {
    /// Whether the relay marked the failure as worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Api { retryable, .. } => *retryable,
            ClientError::Transport(e) => e.is_timeout() || e.is_connect(),
            ClientError::Decode { .. } => false,
        }
    }

    /// Relay error code, when the relay produced one.
    pub fn code(&self) -> Option<u32> {
        match self {
            ClientError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// One transfer recipient. Amounts are decimal strings so values above
/// 2^53 survive JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receiver {
    pub address: String,
    pub amount: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueSummary {
    pub token_id: String,
    pub token_name: String,
    pub token_symbol: String,
    pub decimal_num: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueList {
    pub list: Vec<IssueSummary>,
    pub page_size: usize,
    pub current: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceReply {
    pub token_id: String,
    pub address: String,
    pub balance: String,
    pub utxo_count: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletReply {
    pub address: String,
    pub balance: u64,
    pub utxo_count: usize,
    pub eligible_count: usize,
    pub backed_off_count: usize,
    pub unit_satoshis: u64,
    pub split_in_flight: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthReply {
    pub version: String,
    pub status: String,
    pub network: String,
    pub wallets: usize,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    code: u32,
    message: String,
    #[serde(default)]
    retryable: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenesisData {
    genesis_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxData {
    tx_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenesisBody<'a> {
    genesis_wif: &'a str,
    token_name: &'a str,
    token_symbol: &'a str,
    decimal_num: u8,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IssueBody<'a> {
    genesis_wif: &'a str,
    genesis_id: &'a str,
    token_amount: &'a str,
    receiver_address: &'a str,
    allow_increase_issues: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransferBody<'a> {
    genesis_id: &'a str,
    sender_wif: &'a str,
    receivers: &'a [Receiver],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MergeBody<'a> {
    genesis_id: &'a str,
    sender_wif: &'a str,
}

/// Client for one relay instance.
pub struct FtClient {
    client: Client,
    base_url: String,
}

impl FtClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create a token; returns its genesis id.
    pub async fn genesis(
        &self,
        genesis_wif: &str,
        token_name: &str,
        token_symbol: &str,
        decimal_num: u8,
    ) -> Result<String, ClientError> {
        let body = GenesisBody {
            genesis_wif,
            token_name,
            token_symbol,
            decimal_num,
        };
        let data: GenesisData = self.post("/api/ft/genesis", &body).await?;
        Ok(data.genesis_id)
    }

    /// Mint `amount` to `receiver`; returns the issue transaction id.
    pub async fn issue(
        &self,
        genesis_wif: &str,
        genesis_id: &str,
        amount: &str,
        receiver: &str,
        allow_increase_issues: bool,
    ) -> Result<String, ClientError> {
        let body = IssueBody {
            genesis_wif,
            genesis_id,
            token_amount: amount,
            receiver_address: receiver,
            allow_increase_issues,
        };
        let data: TxData = self.post("/api/ft/issue", &body).await?;
        Ok(data.tx_id)
    }

    pub async fn transfer(
        &self,
        genesis_id: &str,
        sender_wif: &str,
        receivers: &[Receiver],
    ) -> Result<String, ClientError> {
        let body = TransferBody {
            genesis_id,
            sender_wif,
            receivers,
        };
        let data: TxData = self.post("/api/ft/transfer", &body).await?;
        Ok(data.tx_id)
    }

    pub async fn merge(&self, genesis_id: &str, sender_wif: &str) -> Result<String, ClientError> {
        let body = MergeBody {
            genesis_id,
            sender_wif,
        };
        let data: TxData = self.post("/api/ft/merge", &body).await?;
        Ok(data.tx_id)
    }

    pub async fn issue_list(&self, page_size: usize, current_page: usize) -> Result<IssueList, ClientError> {
        let query = [
            ("pageSize", page_size.to_string()),
            ("currentPage", current_page.to_string()),
        ];
        self.get("/api/ft/queryIssueList", &query).await
    }

    pub async fn balance(&self, genesis_id: &str, address: &str) -> Result<BalanceReply, ClientError> {
        let query = [("genesisId", genesis_id.to_string()), ("address", address.to_string())];
        self.get("/api/ft/queryAddressBalance", &query).await
    }

    pub async fn wallets(&self) -> Result<Vec<WalletReply>, ClientError> {
        self.get("/api/wallets", &[]).await
    }

    pub async fn health(&self) -> Result<HealthReply, ClientError> {
        let resp = self.client.get(format!("{}/health", self.base_url)).send().await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|_| ClientError::Decode { status, body: text })
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ClientError> {
        let resp = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;
        decode(resp).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ClientError> {
        let resp = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .send()
            .await?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    let status = resp.status();
    let text = resp.text().await?;

    if status.is_success() {
        return match serde_json::from_str::<Envelope<T>>(&text) {
            Ok(envelope) => Ok(envelope.data),
            Err(_) => Err(ClientError::Decode {
                status: status.as_u16(),
                body: text,
            }),
        };
    }

    match serde_json::from_str::<ErrorEnvelope>(&text) {
        Ok(err) => Err(ClientError::Api {
            status: status.as_u16(),
            code: err.code,
            message: err.message,
            retryable: err.retryable,
        }),
        Err(_) => Err(ClientError::Decode {
            status: status.as_u16(),
            body: text,
        }),
    }
}
