use anyhow::{Context, Result};
use std::sync::Arc;
use submit_service::api::{start_api_server, AppState};
use submit_service::{factory, Config};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting HMA Submit Service"
    );

    init_metrics(config.service.metrics_port)?;

    // Stores are shared between the workflow and the readiness probe
    let records = factory::create_record_store(&config).await?;
    let objects = factory::create_object_store(&config).await?;
    let fetcher = factory::create_fetcher(&config)?;

    let workflow = Arc::new(factory::create_workflow(
        &config,
        records.clone(),
        objects.clone(),
        fetcher,
    ));

    let api_state = AppState {
        workflow,
        records,
        objects,
    };

    start_api_server(api_state, &config.api, shutdown_signal()).await?;

    info!("Submit service stopped");

    Ok(())
}

/// JSON logs, filtered by `RUST_LOG` or the configured level
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Serve `submit.*` counters for Prometheus scraping
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port, "Metrics endpoint listening");

    Ok(())
}

/// Resolves on SIGINT or SIGTERM; in-flight submissions finish first
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!(signal = "SIGINT", "Shutdown requested");
        }
        _ = terminate => {
            info!(signal = "SIGTERM", "Shutdown requested");
        }
    }

    info!("Draining in-flight submissions");
}
