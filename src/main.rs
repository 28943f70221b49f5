// =============================================================================
// Fraud Screening Core — Main Entry Point
// =============================================================================
//
// Real-time screening for a virtual-currency economy: every reported
// transaction is screened by deterministic rules (L1), escalated to an
// arbitrator with a local fallback when a rule fires (L2), and reflected in a
// per-account state machine that gates withdrawals.
// =============================================================================

use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fraud_screen_core::api;
use fraud_screen_core::app_state::AppState;
use fraud_screen_core::config::ScreeningConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Fraud Screening Core — starting up");

    let mut config = ScreeningConfig::load("screening_config.json").unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        ScreeningConfig::default()
    });

    if let Ok(bind) = std::env::var("FRAUD_BIND_ADDR") {
        config.bind_addr = bind;
    }
    if let Ok(mirror_url) = std::env::var("FRAUD_MIRROR_URL") {
        if !mirror_url.is_empty() {
            config.mirror_url = Some(mirror_url);
        }
    }
    if let Ok(persistence_path) = std::env::var("FRAUD_PERSISTENCE_PATH") {
        if !persistence_path.is_empty() {
            config.persistence_path = Some(persistence_path);
        }
    }
    if let Ok(arbitrator_url) = std::env::var("FRAUD_ARBITRATOR_URL") {
        if !arbitrator_url.is_empty() {
            config.arbitrator_url = Some(arbitrator_url);
        }
    }
    if let Ok(arbitrator_key) = std::env::var("FRAUD_ARBITRATOR_API_KEY") {
        if !arbitrator_key.is_empty() {
            config.arbitrator_api_key = Some(arbitrator_key);
        }
    }

    info!(
        window_seconds = config.window_seconds,
        amount_threshold = config.amount_threshold,
        mirror_enabled = config.mirror_url.is_some(),
        persistence_enabled = config.persistence_path.is_some(),
        arbitrator_enabled = config.arbitrator_url.is_some(),
        "screening configuration resolved"
    );

    let bind_addr = config.bind_addr.clone();
    let config_for_shutdown = config.clone();
    let state = Arc::new(AppState::new(config).await);

    let app = api::rest::router(state.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind API server");
    info!(addr = %bind_addr, "API server listening");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    info!("Screening core running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");
    server.abort();

    if let Err(e) = config_for_shutdown.save("screening_config.json") {
        error!(error = %e, "Failed to save screening config on shutdown");
    }

    info!("Fraud Screening Core shut down complete.");
    Ok(())
}
