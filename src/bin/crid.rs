//! crid - CRI Robot Control Daemon
//!
//! Connects a CRI-protocol robot arm to a line-oriented command interface:
//! - Connection lifecycle management (connect, enable, kinematics-ready)
//! - Named pick-and-place sequences loaded from YAML
//! - Sequential execution with per-step timeout and abort-on-failure

use anyhow::{Context, Result};
use clap::Parser;
use crid::{CommandService, CommandStream, Config, ConnectionManager, CriClient, SequenceLibrary};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "crid")]
#[command(about = "CRI robot control daemon - named motion sequences over a line protocol")]
#[command(version)]
struct Args {
    /// Path to the daemon configuration file
    #[arg(short, long)]
    config: Option<String>,
}

impl Args {
    fn get_config_path(&self) -> String {
        self.config
            .clone()
            .or_else(|| std::env::var("CRID_CONFIG_PATH").ok())
            .unwrap_or_else(|| "config/default_config.yaml".to_string())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = args.get_config_path();

    // Logs go to stderr; stdout carries JSON responses only
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    info!("CRI Robot Control Daemon");
    info!("{}", "=".repeat(50));
    info!("Using config: {}", config_path);

    let config = Config::load_from_path(&config_path).context("Failed to load configuration")?;
    info!("Robot: {}:{}", config.robot.host, config.robot.port);

    let library =
        SequenceLibrary::load_from_path(&config.sequences.path).with_context(|| {
            format!("Failed to load sequences from {}", config.sequences.path)
        })?;
    info!(
        "Loaded {} sequences: {}",
        library.len(),
        library.names().join(", ")
    );

    let link = CriClient::new().context("Failed to create CRI client")?;
    let manager = Arc::new(ConnectionManager::new(
        Box::new(link),
        config.robot.ready_timeout(),
    ));
    let service = CommandService::new(manager, Arc::new(library), config.robot.clone());

    let mut stream = CommandStream::new(service);
    stream.run().await.context("Command stream error")?;

    info!("Performing graceful shutdown");
    stream.shutdown().await.context("Failed during shutdown")?;

    info!("Shutdown complete");
    Ok(())
}
