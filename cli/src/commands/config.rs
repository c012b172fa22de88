// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use podgate_core::domain::gateway_config::{GatewayConfigManifest, RuntimeBackend};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./podgate-config.yaml)
        #[arg(short, long, default_value = "./podgate-config.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output } => generate(&output).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = GatewayConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. PODGATE_CONFIG_PATH: {}",
            std::env::var("PODGATE_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./podgate-config.yaml");
        println!("  4. ~/.podgate/config.yaml");
        println!("  5. /etc/podgate/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    let spec = &config.spec;
    println!("{}", "Target:".bold());
    println!("  Namespace: {}", display_or_unset(&spec.target.namespace));
    println!("  Pod: {}", display_or_unset(&spec.target.instance));
    match &spec.target.container {
        Some(container) => println!("  Container: {} (fixed)", container),
        None => println!("  Container: {}", "(SSH login name)".dimmed()),
    }
    println!();

    println!("{}", "Listener:".bold());
    println!("  Address: {}:{}", spec.listen.bind_address, spec.listen.port);
    println!("  Host key: {}", spec.listen.host_key_path);
    if let Some(timeout) = spec.listen.inactivity_timeout_secs {
        println!("  Inactivity timeout: {}s", timeout);
    }
    println!();

    println!("{}", "Runtime:".bold());
    println!("  Backend: {:?}", spec.runtime.backend);
    match spec.runtime.backend {
        RuntimeBackend::Kubernetes => println!(
            "  Kubeconfig: {}",
            spec.runtime
                .kubeconfig
                .as_deref()
                .unwrap_or("(KUBECONFIG, ~/.kube/config or in-cluster)")
        ),
        RuntimeBackend::Docker => {
            println!(
                "  Docker socket: {}",
                spec.runtime
                    .docker_socket_path
                    .as_deref()
                    .unwrap_or("(auto-detect)")
            );
            println!("  Target resolution: {:?}", spec.runtime.resolution);
        }
    }
    println!("  Default shell: {}", spec.session.default_shell.join(" "));
    println!(
        "  Spool directory: {}",
        spec.spool.directory.as_deref().unwrap_or("(system temp)")
    );
    println!();

    Ok(())
}

fn display_or_unset(value: &str) -> String {
    if value.is_empty() {
        "(not set)".yellow().to_string()
    } else {
        value.to_string()
    }
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = GatewayConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: &Path) -> Result<()> {
    let mut sample = GatewayConfigManifest::default();
    sample.spec.target.namespace = "default".to_string();
    sample.spec.target.instance = "my-pod".to_string();

    sample
        .to_yaml_file(output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generated_config_validates() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("podgate-config.yaml");

        generate(&output).await.unwrap();

        let config = GatewayConfigManifest::from_yaml_file(&output).unwrap();
        config.validate().unwrap();
        assert_eq!(config.spec.target.instance, "my-pod");
        assert_eq!(config.spec.listen.port, 2222);
    }
}
