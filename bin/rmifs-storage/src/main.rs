//! rmifs storage server daemon

use anyhow::Result;
use clap::Parser;
use rmifs_common::Config;
use rmifs_proto::RegistrationStub;
use rmifs_rmi::Stub;
use rmifs_storage::StorageServer;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "rmifs-storage")]
#[command(about = "rmifs Storage Server")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/rmifs/storage.toml")]
    config: String,

    /// Directory holding the served files (overrides config)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Externally routable hostname of this server (overrides config)
    #[arg(long)]
    hostname: Option<String>,

    /// Naming server host (overrides config)
    #[arg(long)]
    naming_host: Option<String>,

    /// Client interface port, 0 for any (overrides config)
    #[arg(long)]
    client_port: Option<u16>,

    /// Command interface port, 0 for any (overrides config)
    #[arg(long)]
    command_port: Option<u16>,

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

    info!("Starting rmifs storage server");

    let mut config = match std::fs::read_to_string(&args.config) {
        Ok(contents) => toml::from_str::<Config>(&contents)?,
        Err(e) => {
            warn!("Could not read config file {}: {}, using defaults", args.config, e);
            Config::default()
        }
    };

    let storage = &mut config.storage;
    if let Some(root) = args.root {
        storage.root = root;
    }
    if let Some(hostname) = args.hostname {
        storage.hostname = hostname;
    }
    if let Some(host) = args.naming_host {
        storage.naming_host = host;
    }
    if let Some(port) = args.client_port {
        storage.client_port = port;
    }
    if let Some(port) = args.command_port {
        storage.command_port = port;
    }

    info!("Serving {}", config.storage.root.display());

    let naming: RegistrationStub =
        Stub::connect_to(&config.storage.naming_host, config.storage.registration_port)?;
    let server = StorageServer::new(&config.storage, &config.rmi)?;
    server.start(&config.storage.hostname, &naming).await?;

    tokio::signal::ctrl_c().await.ok();
    info!("Shutting down...");
    server.stop().await;

    Ok(())
}
