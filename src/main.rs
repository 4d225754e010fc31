//! Multi-host template server (v1)
//!
//! Serves compiled templates for many hosts, each mapped to its own folder,
//! and recompiles them in the background when their files change.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                    TEMPLATER                          │
//!   Client Request     │  ┌─────────┐    ┌──────────┐    ┌──────────────────┐  │
//!   ───────────────────┼─▶│  http   │───▶│ registry │───▶│  TemplateRoot    │  │
//!                      │  │ server  │    │ host →   │    │  (compiled set)  │  │
//!                      │  └─────────┘    │ folder   │    └────────┬─────────┘  │
//!                      │                 └────▲─────┘             │            │
//!                      │                      │ swap        sandbox / blob     │
//!                      │                 ┌────┴───────┐     ┌─────▼──────┐     │
//!                      │                 │ reconciler │     │ folder on  │     │
//!                      │                 │ (polling)  │────▶│ disk       │     │
//!                      │                 └────────────┘     └────────────┘     │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use clap::Parser;
use tokio::net::TcpListener;

use templater::config::{load_server_config, ServerConfig};
use templater::observability::{logging, metrics};
use templater::{HttpServer, Registry, RegistryOptions, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "templater")]
#[command(about = "Serve hot-reloaded templates for many hosts", long_about = None)]
struct Cli {
    /// Server settings file (TOML).
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Hosts file listing host → folder entries (JSON or TOML).
    #[arg(long)]
    hosts: Option<PathBuf>,

    /// Bind address, e.g. 0.0.0.0:8080.
    #[arg(short, long)]
    bind: Option<String>,

    /// Seconds between checks for changed templates.
    #[arg(long)]
    poll_secs: Option<u64>,
}

impl Cli {
    fn into_config(self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.settings {
            Some(path) => load_server_config(path)?,
            None => ServerConfig::default(),
        };
        if let Some(hosts) = self.hosts {
            config.registry.hosts_file = hosts;
        }
        if let Some(bind) = self.bind {
            config.listener.bind_address = bind;
        }
        if let Some(secs) = self.poll_secs {
            config.registry.poll_interval_secs = secs;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!("templater v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        hosts_file = %config.registry.hosts_file.display(),
        poll_interval_secs = config.registry.poll_interval_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let registry = Registry::start(
        &config.registry.hosts_file,
        RegistryOptions::from_config(&config.registry),
    )?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(registry.clone(), &config.listener);
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl-C received, shutting down");
    shutdown.trigger();

    server_task.await??;
    registry.shutdown();

    tracing::info!("Shutdown complete");
    Ok(())
}
