//! Operational endpoints: liveness and fee wallet status.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::response::ApiResponse;
use crate::http::server::AppState;
use crate::wallet::WalletStatus;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub network: &'static str,
    pub wallets: usize,
}

pub async fn get_health(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        network: state.orchestrator.network().as_str(),
        wallets: state.orchestrator.wallets().count(),
    })
}

pub async fn get_wallets(State(state): State<AppState>) -> Json<ApiResponse<Vec<WalletStatus>>> {
    ApiResponse::ok(state.orchestrator.wallet_status())
}
