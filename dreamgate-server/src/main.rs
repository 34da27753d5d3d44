//! Dreamgate server binary.
//!
//! `dreamgate start` loads configuration (YAML file + environment),
//! assembles the engine, and serves the HTTP surface until Ctrl-C.
//! `dreamgate config` prints the effective configuration.

use clap::{Parser, Subcommand};
use dreamgate_server::server;
use dreamgate::config::GatewayConfig;
use dreamgate::engine::Engine;
use dreamgate::logging;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "dreamgate", version = dreamgate::VERSION, about = "Gateway for the Jimeng/Dreamina generation service")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway server (the default).
    Start {
        /// Override the bind host.
        #[arg(long)]
        host: Option<String>,

        /// Override the bind port.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the effective configuration and exit.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("dreamgate: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => GatewayConfig::load_from(path)?,
        None => GatewayConfig::load()?,
    };

    match cli.command.unwrap_or(Command::Start {
        host: None,
        port: None,
    }) {
        Command::Config => {
            println!("{}", serde_yaml_string(&config)?);
            Ok(())
        }
        Command::Start { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            let _guard = logging::init_logging(
                &config.logging.dir,
                &config.logging.file,
                &config.logging.level,
            )?;
            info!(version = dreamgate::VERSION, "Dreamgate starting");

            let host = config.server.host.clone();
            let port = config.server.port;
            let engine = Engine::new(config)?;
            engine.start();

            let shutdown = CancellationToken::new();
            let ctrl_c_shutdown = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutdown signal received");
                    ctrl_c_shutdown.cancel();
                }
            });

            server::serve(engine, &host, port, shutdown).await?;
            Ok(())
        }
    }
}

fn serde_yaml_string(config: &GatewayConfig) -> Result<String, Box<dyn std::error::Error>> {
    Ok(serde_yaml::to_string(config)?)
}
