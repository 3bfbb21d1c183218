//! Gateway daemon entry point

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use peergate::engine::TcpEngineBackend;
use peergate::plugin::PluginTable;
use peergate::relay::{RelayController, VlmRelay};
use peergate::{Gateway, GatewayConfig, GatewayContext};

#[derive(Debug, Parser)]
#[command(name = "peergate", version, about = "HTTP gateway over a P2P streaming engine")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured listen address
    #[arg(long)]
    listen: Option<std::net::SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("peergate=info".parse()?),
        )
        .init();

    let mut config = match &cli.config {
        Some(path) => GatewayConfig::load(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }

    // A configured-but-unreachable relay refuses to start at all: serving
    // requests that can never fan out would only hide the operational
    // problem.
    let relay: Option<Arc<dyn RelayController>> = if config.relay.enabled {
        match VlmRelay::connect(&config.relay).await {
            Ok(relay) => Some(Arc::new(relay)),
            Err(e) => {
                tracing::error!(error = %e, "relay unreachable, refusing to start");
                return Err(e.into());
            }
        }
    } else {
        None
    };

    let engine = Arc::new(TcpEngineBackend::new(config.engine.clone()));
    let context = GatewayContext::new(config, engine, relay, PluginTable::new())?;

    let gateway = Gateway::bind(context).await?;

    gateway
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("gateway stopped");
    Ok(())
}
