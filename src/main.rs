//! BMI agent - face-scan and scale ingestion for measurement sessions
//!
//! Correlates HikVision face-scan callbacks with averaged weight/height
//! readings from a serial scale into one measurement session per person,
//! persisted through the access-control API.
//!
//! Module structure:
//! - `domain/` - Core business types (ScanEvent, PersonSession, readings)
//! - `io/` - External interfaces (HTTP listener, serial scale, API client)
//! - `services/` - Business logic (Sampler, SessionCorrelator)
//! - `infra/` - Infrastructure (Config, Metrics)

use bmi_agent::infra::{Config, Metrics};
use bmi_agent::io::{AccessControlApi, FaceIdListener, FaceIdListenerConfig, ScaleMonitor, WbApiClient};
use bmi_agent::services::SessionCorrelator;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// BMI agent - measurement session ingestion service
#[derive(Parser, Debug)]
#[command(name = "bmi-agent", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("bmi-agent starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        listener_port = %config.listener_port(),
        listener_path = %config.listener_path(),
        scale_device = %config.scale_device(),
        scale_baud = %config.scale_baud(),
        api_base_url = %config.api_base_url(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics = Arc::new(Metrics::new());
    let api = Arc::new(WbApiClient::new(&config)?);

    // Authenticate in the background; lookups degrade gracefully until then
    if let (Some(username), Some(password)) = (config.api_username(), config.api_password()) {
        let auth_api = api.clone();
        let username = username.to_string();
        let password = password.to_string();
        tokio::spawn(async move {
            if !auth_api.authenticate(&username, &password).await {
                warn!("api_authentication_failed");
            }
        });
    } else {
        warn!("api_credentials_missing");
    }

    // Session event channel (bounded for backpressure)
    let (event_tx, event_rx) = mpsc::channel(256);

    // Start the face-scan HTTP listener
    let listener_config = FaceIdListenerConfig {
        port: config.listener_port(),
        path: config.listener_path().to_string(),
    };
    let mut listener = FaceIdListener::new(listener_config, event_tx.clone(), metrics.clone());
    listener.start().await?;

    // Start the serial scale monitor
    let scale = ScaleMonitor::new(&config)
        .with_event_tx(event_tx.clone())
        .with_metrics(metrics.clone());
    let scale_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        scale.run(scale_shutdown).await;
    });

    // Periodic metrics summary
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    // Run the session correlator - consumes events until shutdown
    let mut correlator = SessionCorrelator::new(&config, api, metrics, event_tx);
    let mut correlator_shutdown = shutdown_rx;
    tokio::select! {
        _ = correlator.run(event_rx) => {}
        _ = correlator_shutdown.changed() => {}
    }

    listener.stop().await;

    info!("bmi-agent shutdown complete");
    Ok(())
}
