//! Protocol builder HTTP client.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tokio::time::timeout;

use crate::builder::types::{
    BuilderError, BuilderReply, BuilderResult, GenesisRequest, IssueRequest, RouteCheckRequest,
    TransferRequest, TxTemplate,
};
use crate::config::schema::BuilderConfig;

/// Produces unsigned templates for token operations.
#[async_trait]
pub trait ProtocolBuilder: Send + Sync {
    async fn genesis(&self, req: &GenesisRequest) -> BuilderResult<TxTemplate>;

    async fn issue(&self, req: &IssueRequest) -> BuilderResult<TxTemplate>;

    async fn route_check(&self, req: &RouteCheckRequest) -> BuilderResult<TxTemplate>;

    async fn transfer(&self, req: &TransferRequest) -> BuilderResult<TxTemplate>;
}

/// Builder reached over `POST {prefix}/{route}`.
#[derive(Clone)]
pub struct HttpProtocolBuilder {
    client: reqwest::Client,
    prefix: String,
    timeout_secs: u64,
}

impl HttpProtocolBuilder {
    pub fn new(config: &BuilderConfig) -> BuilderResult<Self> {
        let prefix: url::Url = config.url_prefix.parse().map_err(|e| {
            BuilderError::Transport(format!("Invalid builder URL '{}': {}", config.url_prefix, e))
        })?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BuilderError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            prefix: prefix.as_str().trim_end_matches('/').to_string(),
            timeout_secs: config.timeout_secs,
        })
    }

    async fn post<B: Serialize + Sync>(&self, route: &str, body: &B) -> BuilderResult<TxTemplate> {
        let url = format!("{}{}", self.prefix, route);
        tracing::debug!(url = %url, "Requesting template");

        let send = async {
            let res = self
                .client
                .post(&url)
                .json(body)
                .send()
                .await
                .map_err(|e| BuilderError::Transport(e.to_string()))?;
            res.json::<BuilderReply<TxTemplate>>()
                .await
                .map_err(|e| BuilderError::Transport(format!("invalid reply from {}: {}", route, e)))
        };

        let reply = timeout(Duration::from_secs(self.timeout_secs), send)
            .await
            .map_err(|_| BuilderError::Timeout(self.timeout_secs))??;

        if reply.code != 0 {
            tracing::warn!(route, code = reply.code, msg = %reply.msg, "Builder rejected request");
            return Err(BuilderError::Rejected {
                route: route.to_string(),
                code: reply.code,
                msg: reply.msg,
            });
        }
        reply.data.ok_or_else(|| BuilderError::EmptyReply(route.to_string()))
    }
}

#[async_trait]
impl ProtocolBuilder for HttpProtocolBuilder {
    async fn genesis(&self, req: &GenesisRequest) -> BuilderResult<TxTemplate> {
        self.post("/genesis", req).await
    }

    async fn issue(&self, req: &IssueRequest) -> BuilderResult<TxTemplate> {
        self.post("/issue", req).await
    }

    async fn route_check(&self, req: &RouteCheckRequest) -> BuilderResult<TxTemplate> {
        self.post("/routeCheck", req).await
    }

    async fn transfer(&self, req: &TransferRequest) -> BuilderResult<TxTemplate> {
        self.post("/transfer", req).await
    }
}

impl std::fmt::Debug for HttpProtocolBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProtocolBuilder")
            .field("prefix", &self.prefix)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
