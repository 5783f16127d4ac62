//! Inventory-aware market maker on the Bybit public stream.
//!
//! Usage: `inventory_mm [config.toml]`. The path may also come from
//! `INVENTORY_MM_CONFIG`; without either the defaults (plus `INVENTORY_MM_*` overrides)
//! are used. Quotes and fills are simulated; no orders are sent.

use anyhow::{Context, Result};
use inventory_mm::{
    market_maker::{EmaController, MarketMakerConfig, MarketState, Orchestrator},
    ws_client::{run_feed, BybitSession},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    init_tracing();

    let config = load_config()?;
    info!(
        symbol = %config.symbol,
        url = %config.ws_url,
        cash = config.initial_cash,
        crypto = config.initial_crypto,
        fee = config.trading_fee_rate,
        "Starting market maker"
    );

    let ema = EmaController::shared(config.ema_params());
    let market = Arc::new(MarketState::new(config.market_state_params(), ema));
    let mut session = BybitSession::new(config.feed_config()).context("Invalid feed config")?;
    let backoff = config.backoff();

    let token = CancellationToken::new();
    {
        let token = token.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C, shutting down");
                    token.cancel();
                }
                Err(err) => warn!("Failed to listen for Ctrl+C: {err}"),
            }
        });
    }

    let feed = {
        let market = Arc::clone(&market);
        let token = token.clone();
        tokio::spawn(async move {
            let result = run_feed(&mut session, &market, &backoff, &token).await;
            // A dead feed stops the quoting loop too.
            token.cancel();
            result
        })
    };

    let mut orchestrator = Orchestrator::from_config(&config, Arc::clone(&market));
    orchestrator.run(token.clone()).await;
    token.cancel();

    match feed.await.context("Feed task panicked")? {
        Ok(()) => {
            info!(cycles = orchestrator.cycles(), "Shut down cleanly");
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "Feed failed permanently");
            Err(err).context("Market data feed failed")
        }
    }
}

fn load_config() -> Result<MarketMakerConfig> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("INVENTORY_MM_CONFIG").ok());
    match path {
        Some(path) => MarketMakerConfig::from_file(&path),
        None => MarketMakerConfig::from_env(),
    }
}

fn init_tracing() {
    if tracing::subscriber::set_global_default(
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .finish(),
    )
    .is_err()
    {
        // Tracing already initialised elsewhere.
    }
}
