use anyhow::{Context, Result};
use files_service::{
    start_api_server, AppState, Config, ContentTypeResolver, FileRegistry, S3ObjectStore,
    SqliteMetadataStore, UuidKeyGenerator,
};
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        bucket = %config.s3.bucket,
        database = %config.database.url,
        "Starting files service"
    );

    if config.service.metrics_enabled {
        init_metrics(config.service.metrics_port)?;
    }

    let metadata_store = SqliteMetadataStore::new(&config.database)
        .await
        .context("Failed to initialize metadata store")?;

    if config.database.run_migrations {
        metadata_store
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    let object_store = S3ObjectStore::new(&config.s3).await;

    if config.s3.create_bucket {
        object_store
            .ensure_bucket()
            .await
            .context("Failed to ensure bucket exists")?;
    }

    let registry = FileRegistry::new(
        Arc::new(object_store),
        Arc::new(metadata_store),
        Arc::new(UuidKeyGenerator),
        ContentTypeResolver::new(config.registry.content_type_order.clone()),
    );

    let api_state = AppState {
        registry: Arc::new(registry),
    };

    start_api_server(api_state, &config.api, shutdown_signal()).await?;

    info!("Files service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
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
            info!("Received Ctrl+C signal, draining connections");
        }
        _ = terminate => {
            info!("Received SIGTERM signal, draining connections");
        }
    }
}
