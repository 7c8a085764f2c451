//! rmifs naming server daemon

use anyhow::Result;
use clap::Parser;
use rmifs_common::Config;
use rmifs_naming::NamingServer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "rmifs-naming")]
#[command(about = "rmifs Naming Server")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/rmifs/naming.toml")]
    config: String,

    /// Host to bind on (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Service interface port (overrides config)
    #[arg(long)]
    service_port: Option<u16>,

    /// Registration interface port (overrides config)
    #[arg(long)]
    registration_port: Option<u16>,

    /// Disable replication and pruning of files
    #[arg(long)]
    no_replication: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting rmifs naming server");

    let mut config = match std::fs::read_to_string(&args.config) {
        Ok(contents) => toml::from_str::<Config>(&contents)?,
        Err(e) => {
            warn!("Could not read config file {}: {}, using defaults", args.config, e);
            Config::default()
        }
    };

    if let Some(host) = args.host {
        config.naming.host = host;
    }
    if let Some(port) = args.service_port {
        config.naming.service_port = port;
    }
    if let Some(port) = args.registration_port {
        config.naming.registration_port = port;
    }
    if args.no_replication {
        config.naming.replication.enabled = false;
    }

    let server = NamingServer::new(&config.naming, &config.rmi)?;
    server.start().await?;

    tokio::signal::ctrl_c().await.ok();
    info!("Shutting down...");
    server.stop().await;

    Ok(())
}
