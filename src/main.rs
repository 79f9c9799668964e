use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use rpc_proxy::config::load_config;
use rpc_proxy::lifecycle::{listen_for_shutdown, Shutdown};
use rpc_proxy::observability::{logging::init_logging, metrics::init_metrics};
use rpc_proxy::{HttpServer, Metrics};

#[derive(Debug, Parser)]
#[command(name = "rpc-proxy", version, about = "Hardened JSON-RPC reverse proxy")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rpc-proxy starting");

    tracing::info!(
        bind_address = %config.server.bind_address,
        backends = config.backends.len(),
        groups = config.backend_groups.len(),
        methods = config.rpc_method_mappings.len(),
        timeout_secs = config.server.timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = HttpServer::new(&config, Metrics::global())?;
    let listener = TcpListener::bind(&config.server.bind_address).await?;

    let shutdown = Shutdown::new();
    tokio::spawn(listen_for_shutdown(shutdown.clone()));

    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
