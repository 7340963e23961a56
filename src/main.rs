//! Geyser Sentinel - real-time token price monitor and detector
//!
//! Entry point: loads configuration, installs tracing, builds the shared
//! context and runs the detection and position streams until shutdown.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use geyser_sentinel::config::AppConfig;
use geyser_sentinel::context::SentinelContext;
use geyser_sentinel::detection::TokenDetector;
use geyser_sentinel::error::{AppError, AppResult};
use geyser_sentinel::monitoring::{PositionMonitor, PumpFunPriceClient};
use geyser_sentinel::stream::{GeyserEndpoint, GeyserTransport, Transport};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("Starting Geyser Sentinel v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    tracing::info!(
        endpoint = %config.stream.endpoint,
        mode = %config.detection.mode,
        observer = ?config.hooks.observer,
        "Configuration loaded"
    );

    let transport: Arc<dyn Transport> = Arc::new(GeyserTransport::new(GeyserEndpoint {
        url: config.stream.endpoint.clone(),
        x_token: config.stream.x_token.clone(),
        connect_timeout: config.stream.connect_timeout(),
    }));

    let lookup = Arc::new(PumpFunPriceClient::from_config(&config.fallback).map_err(AppError::from)?);
    let detection_config = config.detection.clone();
    let commitment = config.stream.commitment;

    let ctx = SentinelContext::new(config);

    let detector = TokenDetector::new(detection_config, commitment, transport.clone());
    detector.on_token_detected(|token| {
        tracing::info!(
            mint = %token.mint,
            is_sell = token.is_sell,
            signature = %token.raw_transaction.signature,
            "Detected token"
        );
    });

    let monitor = PositionMonitor::new(ctx.clone(), transport, lookup);
    monitor.on_price_update(|mint, price_usd| {
        tracing::debug!(mint = %mint, price_usd, "Position price");
    });

    detector.start().await?;
    monitor.start().await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, stopping streams");

    detector.stop().await;
    monitor.stop().await;

    let stats = monitor.get_stats();
    tracing::info!(
        positions = stats.total_positions,
        prices_updated = stats.prices_updated,
        tracked_tokens = ctx.health.tracked_count(),
        "Geyser Sentinel stopped"
    );

    Ok(())
}

/// Wait for Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geyser_sentinel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Load and validate configuration
fn load_config() -> AppResult<AppConfig> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = AppConfig::load().inspect_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
    })?;
    config.validate()?;

    Ok(config)
}
