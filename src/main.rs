//! Legacy client interception proxy.
//!
//! Sits between an old game client and the network. A small rule table picks
//! out the requests aimed at retired services (login check, resource list,
//! skin downloads) and answers them locally from today's services; every other
//! byte is relayed to its origin untouched.
//!
//! # Architecture Overview
//!
//! ```text
//!     Legacy client
//!         │
//!         ▼
//!   ┌──────────┐    ┌─────────────┐    ┌──────────┐    ┌────────────┐
//!   │   net    │───▶│ http server │───▶│ routing  │───▶│  handlers  │──▶ upstream ──▶ translate
//!   │ listener │    │ (session)   │    │ rule tbl │    └────────────┘
//!   └──────────┘    └──────┬──────┘    └──────────┘
//!                          │ no match / CONNECT
//!                          ▼
//!                    ┌───────────┐
//!                    │ net relay │───▶ Origin
//!                    └───────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use legacy_proxy::config::{load_config, ProxyConfig};
use legacy_proxy::net::listener::Listener;
use legacy_proxy::observability::{logging, metrics};
use legacy_proxy::{ProxyServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "legacy-proxy")]
#[command(about = "Interception proxy that keeps legacy game clients working", long_about = None)]
struct Cli {
    /// TOML configuration file; built-in defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(port) = cli.port {
        config.set_listen_port(port);
    }
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "legacy-proxy starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        configured_rules = config.rules.len(),
        intercept_enabled = config.intercept.is_enabled(),
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

    let listener = Listener::bind(&config.listener).await?;

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    let server = ProxyServer::new(config).await?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
