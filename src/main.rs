//! Fungible token relay (v1)
//!
//! Pays the fees of fungible-token transactions out of a pool of small
//! fee-wallet outputs and serves token operations over HTTP.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request            ┌───────────────────────────────────────────────┐
//!     ─────────────────────────▶│  http (axum + tower-http layers)              │
//!                               └──────────────────────┬────────────────────────┘
//!                                                      ▼
//!                               ┌───────────────────────────────────────────────┐
//!                               │  token orchestrator                           │
//!                               │  genesis / issue / transfer / merge / queries │
//!                               └──────┬──────────────────┬──────────────┬──────┘
//!                                      ▼                  ▼              ▼
//!                               ┌─────────────┐   ┌──────────────┐  ┌─────────┐
//!                               │ fee wallets │   │   protocol   │  │  store  │
//!                               │ (utxo pool) │   │   builder    │  │         │
//!                               └──────┬──────┘   └──────────────┘  └─────────┘
//!                                      ▼
//!                               ┌─────────────┐
//!                               │chain gateway│──────────────────────────────▶ Ledger
//!                               └─────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use ft_relay::builder::HttpProtocolBuilder;
use ft_relay::chain::HttpChainGateway;
use ft_relay::config::load_config;
use ft_relay::http::HttpServer;
use ft_relay::lifecycle::{build_orchestrator, signals, Services, Shutdown};
use ft_relay::observability::{logging, metrics};
use ft_relay::store::MemoryStore;

#[derive(Parser, Debug)]
#[command(author, version, about = "Fungible token relay", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config/ft-relay.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    logging::init_logging(&config.observability.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        network = config.network.as_str(),
        wallets = config.wallets.len(),
        "ft-relay starting"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let store = match &config.store.snapshot_path {
        Some(path) => MemoryStore::load_from_file(path)?,
        None => MemoryStore::new(None),
    };

    let services = Services {
        gateway: Arc::new(HttpChainGateway::new(config.chain.clone(), config.network)?),
        builder: Arc::new(HttpProtocolBuilder::new(&config.builder)?),
        utxos: Arc::new(store.clone()),
        issuers: Arc::new(store.clone()),
        tokens: Arc::new(store.clone()),
    };

    let orchestrator = Arc::new(build_orchestrator(&config, services).await?);

    // Top up any pool already below the low-water mark.
    for wallet in orchestrator.wallets() {
        wallet.spawn_adjust();
    }

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(&shutdown);

    let server = HttpServer::new(&config.server, orchestrator);
    server.run(listener, shutdown.wait()).await?;

    if let Err(e) = store.save_to_file() {
        tracing::error!(error = %e, "Failed to save store snapshot");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
