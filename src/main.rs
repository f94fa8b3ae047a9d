//! Prerender proxy.
//!
//! ```text
//!   client ──▶ http server ──▶ prerender middleware
//!                                 classify → cache hook → fetch → after hook
//!                                   │                        │
//!                        passthrough│                 respond│
//!                                   ▼                        ▼
//!                            origin handler          rendered page
//!                            (hyper client)          from the rendering service
//!
//!   cross-cutting: config + watcher, observability, lifecycle
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use prerender_proxy::config::{load_config, loader::{apply_overrides, parse_config}, watcher::ConfigWatcher};
use prerender_proxy::http::HttpServer;
use prerender_proxy::lifecycle::{signals::shutdown_on_signal, Shutdown};
use prerender_proxy::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "prerender-proxy", version, about = "Serve prerendered pages to crawlers")]
struct Args {
    /// TOML configuration file; watched for `[prerender]` changes
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`
    #[arg(long)]
    bind: Option<String>,

    /// Override `origin.address`
    #[arg(long)]
    origin: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => parse_config("")?,
    };
    apply_overrides(&mut config, args.bind, args.origin)?;

    logging::init(&config.observability)?;

    tracing::info!("prerender-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        origin = %config.origin.address,
        service_url = %config.prerender.service_url,
        token = config.prerender.token.is_some(),
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

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    // The watcher handle must outlive the server.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, rx) = ConfigWatcher::new(path);
            (Some(watcher.run()?), rx)
        }
        None => {
            let (_tx, rx) = mpsc::unbounded_channel();
            (None, rx)
        }
    };

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    let server = HttpServer::new(config)?;
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
