//! credit_faucet - process entry point
//!
//! Bootstraps the claim engine and serves the gateway:
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────┐    ┌──────────┐
//! │  Config  │───▶│  Engine  │───▶│  Store   │    │ Transfer │
//! │  (YAML)  │    │ (claims) │    │ (flock)  │    │ (HTTP)   │
//! └──────────┘    └──────────┘    └──────────┘    └──────────┘
//! ```
//!
//! The operator's own payout address is resolved once at startup via `/me`,
//! best-effort; resolution failure only disables the self-address guard.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use credit_faucet::client::HttpTransferClient;
use credit_faucet::config::FaucetConfig;
use credit_faucet::engine::ClaimEngine;
use credit_faucet::gateway;
use credit_faucet::logging::init_logging;
use credit_faucet::store::LedgerStore;

fn config_path() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--config" && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "config/faucet.yaml".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = config_path();
    let config = match std::fs::metadata(&path) {
        Ok(_) => FaucetConfig::load(&path)?,
        // No file: run on defaults + environment (container-style deploys).
        Err(_) => {
            let mut config = FaucetConfig::default();
            config.apply_env_overrides();
            config
        }
    };
    config.validate()?;

    let _log_guard = init_logging(&config.log);
    info!(
        api_base = %config.api_base,
        amount = config.amount,
        cooldown_secs = config.cooldown_secs,
        data_file = %config.data_file,
        "starting faucet claim engine"
    );

    let client = Arc::new(HttpTransferClient::new(&config.api_base, &config.sender_secret)?);
    let store = LedgerStore::open(&config.data_file);

    let mut engine = ClaimEngine::new(store, client, config.engine_settings());
    engine.resolve_operator_address().await;

    let app = gateway::router(Arc::new(engine));
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind gateway on {addr}"))?;
    info!(%addr, "gateway listening");
    axum::serve(listener, app).await.context("gateway server failed")?;

    Ok(())
}
