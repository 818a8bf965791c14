//! OGC web service gateway.
//!
//! One HTTP entry point in front of a family of OGC services (map, feature,
//! catalogue, coverage and others).
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────────┐
//!                    │                        GATEWAY                            │
//!                    │                                                           │
//!   Client Request   │  ┌─────────┐   ┌────────────┐   ┌──────────┐              │
//!   ─────────────────┼─▶│  http   │──▶│ envelope   │──▶│ registry │              │
//!                    │  │ server  │   │ KVP / XML  │   │  lookup  │              │
//!                    │  └─────────┘   │ SOAP / MIME│   └────┬─────┘              │
//!                    │                └────────────┘        │                    │
//!                    │                                      ▼                    │
//!                    │                               ┌──────────────┐            │
//!                    │                               │   service    │───▶ backend│
//!                    │                               │   handler    │◀───        │
//!                    │                               └──────┬───────┘            │
//!                    │                                      ▼                    │
//!   Client Response  │  ┌─────────┐   ┌────────────┐   ┌──────────┐              │
//!   ◀────────────────┼──│  gzip   │◀──│ SOAP wrap  │◀──│ response │              │
//!                    │  │         │   │            │   │ capture  │              │
//!                    │  └─────────┘   └────────────┘   └──────────┘              │
//!                    │         failures at any stage → exception encoder          │
//!                    └──────────────────────────────────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use ows_gateway::config::{load_config, ConfigWatcher, GatewayConfig};
use ows_gateway::gateway::{apply_config_updates, GatewayController, GatewaySettings};
use ows_gateway::http::HttpServer;
use ows_gateway::lifecycle::{signals, Shutdown};
use ows_gateway::observability::{logging, metrics};
use ows_gateway::services::{ProcessXsltTransformer, StaticBackends, StylesheetCache, Transformations};

#[derive(Debug, Parser)]
#[command(name = "ows-gateway", version, about = "OGC web service gateway")]
struct Args {
    /// TOML configuration file; built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loaded = args.config.as_deref().map(load_config).transpose();
    let filter = match &loaded {
        Ok(Some(config)) => config.observability.log_filter.clone(),
        _ => GatewayConfig::default().observability.log_filter,
    };
    logging::init_logging(&filter)?;
    let config = match loaded {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    if args.check {
        tracing::info!(services = config.services.len(), "Configuration is valid");
        return Ok(());
    }

    tracing::info!("ows-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        request_timeout_secs = config.timeouts.request_secs,
        services = config.services.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let base_dir = args
        .config
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let transformations = Arc::new(Transformations::new(
        StylesheetCache::new(&base_dir),
        Arc::new(ProcessXsltTransformer::new(config.xslt.processor.clone())),
    ));
    let bind_address = config.listener.bind_address.clone();
    let gateway = Arc::new(GatewayController::new(
        GatewaySettings::new(config, &base_dir),
        Arc::new(StaticBackends::new(&base_dir)),
        transformations,
    )?);

    let shutdown = Arc::new(Shutdown::new());

    // the watcher stops when dropped, so it lives until main returns
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(watcher) => {
                    tokio::spawn(apply_config_updates(gateway.clone(), updates, shutdown.subscribe()));
                    Some(watcher)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
                    None
                }
            }
        }
        None => None,
    };

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move { signals::forward_signals(&signal_shutdown).await });

    HttpServer::new(gateway).run(listener, shutdown.clone()).await?;

    tracing::info!(remaining_tasks = shutdown.listeners(), "Shutdown complete");
    Ok(())
}
