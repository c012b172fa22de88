// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # podgate
//!
//! The `podgate` binary accepts SSH and SFTP connections on one port and
//! bridges them into a single pod. The SSH login name picks the container
//! unless a fixed container is configured.
//!
//! ## Commands
//!
//! - `podgate serve [-n NAMESPACE] [-p POD] [--container NAME] [--kubeconfig FILE] [--runtime kubernetes|docker]` - Run the gateway (default)
//! - `podgate config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use podgate::commands::{self, ConfigCommand, ServeArgs};

/// podgate - SSH and SFTP into a Kubernetes pod over exec
#[derive(Parser)]
#[command(name = "podgate")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "PODGATE_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "PODGATE_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the SSH/SFTP gateway
    #[command(name = "serve")]
    Serve(ServeArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Config { command }) => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), "text")?;
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::Serve(args)) => serve(cli.config, cli.log_level, args).await,
        None => serve(cli.config, cli.log_level, ServeArgs::default()).await,
    }
}

async fn serve(config: Option<PathBuf>, log_level: Option<String>, args: ServeArgs) -> Result<()> {
    let config = commands::serve::load_config(config, &args)?;

    let logging = config
        .spec
        .observability
        .as_ref()
        .and_then(|o| o.logging.clone());
    let level = log_level
        .or_else(|| logging.as_ref().map(|l| l.level.clone()))
        .unwrap_or_else(|| "info".to_string());
    let format = logging
        .map(|l| l.format)
        .unwrap_or_else(|| "text".to_string());
    init_logging(&level, &format)?;

    commands::serve::run(config).await
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format == "json" {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
