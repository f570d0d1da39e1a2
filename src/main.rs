use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use riskwatch_engine::config::Config;
use riskwatch_engine::detector::Detector;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // Initialize structured logging (set RUST_LOG=debug for per-transaction output)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    tracing::info!("RiskWatch engine starting");

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path)?;
    tracing::info!(
        max_velocity = config.detection.max_velocity,
        window_secs = config.detection.velocity_window_secs,
        ml_enabled = config.detection.ml_enabled,
        custom_rules = config.detection.rules.len(),
        "Configuration loaded from {}",
        config_path
    );

    let detector = Arc::new(Detector::new(config.detection.clone()));
    tracing::info!(
        rules = detector.rules().len(),
        scorer = detector.scorer().name(),
        "Detector initialized"
    );

    if !config.api.enabled {
        tracing::warn!("API disabled in configuration, nothing to serve");
        return Ok(());
    }

    // Create shutdown signal
    let shutdown = CancellationToken::new();

    let server = {
        let detector = Arc::clone(&detector);
        let shutdown = shutdown.clone();
        let host = config.api.host.clone();
        let port = config.api.port;
        let max_batch = config.api.max_batch;
        tokio::spawn(async move {
            if let Err(e) =
                riskwatch_engine::api::serve(detector, max_batch, &host, port, shutdown).await
            {
                tracing::error!(error = %e, "API server failed");
            }
        })
    };

    tracing::info!("Engine ready. Press Ctrl+C to stop.");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping API server...");
    shutdown.cancel();

    let _ = server.await;

    let counters = detector.metrics().counters;
    tracing::info!(
        analyzed = counters.transactions_analyzed,
        blocked = counters.transactions_blocked,
        "RiskWatch engine stopped gracefully"
    );
    Ok(())
}
