// src/main.rs - Device server for PI hexapods and GCS2 motion controllers
use std::sync::Arc;

use clap::Parser;
use pigcs_rs::config;
use pigcs_rs::registry::DeviceRegistry;
use pigcs_rs::web;

/// PI GCS2 device server
#[derive(Parser, Debug)]
#[command(name = "pigcs-server", version, about = "Serves PI hexapods and GCS2 motion controllers over HTTP.")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "pigcs.toml")]
    config: String,

    /// Override the bind address from the configuration
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    tracing::info!("Starting pigcs-server {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Loading configuration from: {}", args.config);

    let mut config = config::load_config(&args.config).map_err(|e| {
        tracing::error!("Failed to load config from '{}': {}", args.config, e);
        Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
    })?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    for (name, ctrl) in &config.controllers {
        tracing::info!(
            "Controller {}: {} ({:?}) on {}",
            name,
            ctrl.name.as_deref().unwrap_or("unnamed"),
            ctrl.kind,
            ctrl.connection()?
        );
    }

    let registry = Arc::new(DeviceRegistry::from_config(&config)?);
    registry.init_all().await;

    let app = web::api::create_router(registry.clone());
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!("Web API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown requested");
        })
        .await?;

    registry.shutdown().await;
    Ok(())
}
