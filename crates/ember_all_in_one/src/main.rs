mod config;

use crate::config::ServiceConfig;
use common::nats::NatsClient;
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig, TelemetryProviders};
use edge_relay::EdgeRelay;
use ember_runner::Runner;
use field_devices::{AlarmListener, CameraFeed};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    // Initialize configuration and tracing
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize telemetry (tracing + OpenTelemetry for traces and logs)
    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
    }) {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        region = %config.region,
        areas = %config.areas,
        otel_enabled = config.otel_enabled,
        "Starting ember-all-in-one service"
    );
    debug!("Configuration: {:?}", config);

    // Settings are checked before connecting so a bad value never subscribes
    let edge_relay_config = match config
        .edge_relay_config()
        .and_then(|cfg| cfg.validated().map(|_| cfg))
    {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Invalid edge relay configuration: {}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    info!("Initializing NATS...");
    let nats_client = match NatsClient::connect(
        &config.nats_url,
        Duration::from_secs(config.startup_timeout_secs),
    )
    .await
    {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to connect to NATS: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let edge_relay = match EdgeRelay::new(nats_client.clone(), edge_relay_config) {
        Ok(relay) => relay,
        Err(e) => {
            error!("Failed to initialize edge relay: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    // Build runner with all processes
    let mut runner = Runner::new().with_named_process("edge_relay", edge_relay.into_runner_process());

    if let Some(camera_config) = config.camera_feed_config() {
        match CameraFeed::new(nats_client.create_publisher_client(), camera_config) {
            Ok(feed) => {
                runner = runner.with_named_process("camera_feed", feed.into_runner_process());
            }
            Err(e) => {
                error!("Failed to initialize camera feed: {:#}", e);
                shutdown_telemetry(telemetry_providers);
                std::process::exit(1);
            }
        }
    }

    if let Some(alarm_config) = config.alarm_listener_config() {
        match AlarmListener::new(nats_client.create_subscriber_client(), alarm_config).await {
            Ok(listener) => {
                runner = runner.with_named_process("alarm_listener", listener.into_runner_process());
            }
            Err(e) => {
                error!("Failed to initialize alarm listener: {:#}", e);
                shutdown_telemetry(telemetry_providers);
                std::process::exit(1);
            }
        }
    }

    // Add cleanup handlers
    runner = runner
        .with_closer({
            let nats_for_close = Arc::clone(&nats_client);
            move || {
                Box::pin(async move {
                    info!("Running cleanup tasks...");

                    if let Err(e) = nats_for_close.drain().await {
                        warn!("Failed to drain NATS connection: {:#}", e);
                    }

                    info!("Cleanup complete");
                    // Shutdown telemetry and flush pending traces and logs
                    shutdown_telemetry(telemetry_providers);
                    Ok(())
                })
            }
        })
        .with_closer_timeout(Duration::from_secs(10));

    // Run the service
    let outcome = runner.run().await;
    std::process::exit(outcome.exit_code());
}
