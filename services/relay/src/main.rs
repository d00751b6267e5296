//! Fleet relay entry point

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use fleet_config::BusConfig;
use fleet_relay::{logging, Agent, Hub};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (defaults to config/bus.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Environment overlay loaded from environments/<name>.toml next to the config
    #[arg(short, long, global = true)]
    environment: Option<String>,

    /// Log level or filter directives; RUST_LOG takes precedence
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the broker and wire server, forwarding configured channels to peers
    Hub {
        /// Listen port (overrides wire.port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Connect to a hub, report heartbeats and log forwarded envelopes
    Agent {
        /// Hub host (overrides wire.host)
        #[arg(long)]
        host: Option<String>,

        /// Hub port (overrides wire.port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = BusConfig::load(args.config.as_deref(), args.environment.as_deref())
        .context("Failed to load configuration")?;
    match &args.command {
        Command::Hub { port } => {
            if let Some(port) = port {
                config.wire.port = *port;
            }
        }
        Command::Agent { host, port } => {
            if let Some(host) = host {
                config.wire.host = host.clone();
            }
            if let Some(port) = port {
                config.wire.port = *port;
            }
        }
        Command::Config => {}
    }
    if let Some(level) = args.log_level {
        config.global.log_level = level;
    }
    config.global.json_logs |= args.json_logs;
    config.validate().context("Invalid configuration")?;

    if let Command::Config = args.command {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    logging::init(&config.global.log_level, config.global.json_logs)?;
    info!("Starting fleet relay v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Hub { .. } => run_hub(&config).await,
        Command::Agent { .. } => run_agent(&config).await,
        Command::Config => Ok(()),
    }
}

async fn run_hub(config: &BusConfig) -> anyhow::Result<()> {
    let hub = Hub::new(config)?;
    hub.start().await.context("Failed to start hub")?;

    shutdown_signal().await?;
    hub.shutdown().await;
    Ok(())
}

async fn run_agent(config: &BusConfig) -> anyhow::Result<()> {
    let agent = Agent::new(config)?;
    agent.start();

    shutdown_signal().await?;
    agent.shutdown().await;
    Ok(())
}

async fn shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to install Ctrl-C handler")?;
    info!("Shutdown signal received");
    Ok(())
}
