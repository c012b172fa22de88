// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `podgate serve`: run the SSH/SFTP gateway in the foreground.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use podgate_core::application::RemoteCommandChannel;
use podgate_core::domain::exec::ExecTransport;
use podgate_core::domain::gateway_config::{GatewayConfigManifest, RuntimeBackend, RuntimeConfig};
use podgate_core::domain::target::CommandVector;
use podgate_core::infrastructure::{DockerExecTransport, KubeExecTransport};
use podgate_core::presentation::ssh::SshGatewayServer;

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Namespace of the target pod
    #[arg(short = 'n', long, env = "PODGATE_NAMESPACE")]
    pub namespace: Option<String>,

    /// Name of the target pod
    #[arg(short = 'p', long, env = "PODGATE_INSTANCE")]
    pub pod: Option<String>,

    /// Always use this container instead of the SSH login name
    #[arg(long, env = "PODGATE_CONTAINER")]
    pub container: Option<String>,

    /// Kubeconfig used to reach the cluster API server
    #[arg(long, env = "PODGATE_KUBECONFIG", value_name = "FILE")]
    pub kubeconfig: Option<String>,

    /// Exec backend: kubernetes or docker
    #[arg(long, env = "PODGATE_RUNTIME")]
    pub runtime: Option<RuntimeBackend>,
}

impl ServeArgs {
    /// Flags win over the configuration file.
    pub fn apply(&self, config: &mut GatewayConfigManifest) {
        if let Some(namespace) = &self.namespace {
            config.spec.target.namespace = namespace.clone();
        }
        if let Some(pod) = &self.pod {
            config.spec.target.instance = pod.clone();
        }
        if let Some(container) = &self.container {
            config.spec.target.container = Some(container.clone());
        }
        if let Some(kubeconfig) = &self.kubeconfig {
            config.spec.runtime.kubeconfig = Some(kubeconfig.clone());
        }
        if let Some(runtime) = self.runtime {
            config.spec.runtime.backend = runtime;
        }
    }
}

/// Load, override and validate the configuration for `serve`.
pub fn load_config(
    config_override: Option<PathBuf>,
    args: &ServeArgs,
) -> Result<GatewayConfigManifest> {
    let mut config = GatewayConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    args.apply(&mut config);
    config
        .validate()
        .context("Configuration validation failed")?;
    Ok(config)
}

pub async fn run(config: GatewayConfigManifest) -> Result<()> {
    info!(
        "Starting podgate for pod {}/{}",
        config.spec.target.namespace, config.spec.target.instance
    );

    if let Some(metrics) = config
        .spec
        .observability
        .as_ref()
        .and_then(|o| o.metrics.as_ref())
        .filter(|m| m.enabled)
    {
        let address = SocketAddr::from(([0, 0, 0, 0], metrics.port));
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(address)
            .install()
            .context("Failed to start Prometheus exporter")?;
        info!("Metrics exposed on {}", address);
    }

    let transport = connect_transport(&config.spec.runtime, config.spec.target.container.clone())
        .await?;
    let remote_offset = config
        .spec
        .session
        .remote_offset()
        .context("Invalid spec.session.remote_utc_offset_secs")?;

    let channel = RemoteCommandChannel::new(transport);
    let server = SshGatewayServer::new(
        config.target_selector(),
        channel,
        CommandVector::new(config.spec.session.default_shell.clone()),
    )
    .with_spool_dir(config.spec.spool.directory.clone().map(PathBuf::from))
    .with_remote_offset(remote_offset);

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, stopping");
            trigger.cancel();
        }
    });

    println!(
        "{}",
        format!(
            "✓ podgate listening on {}:{}",
            config.spec.listen.bind_address, config.spec.listen.port
        )
        .green()
    );

    server
        .serve(&config.spec.listen, shutdown)
        .await
        .context("SSH gateway failed")?;

    Ok(())
}

async fn connect_transport(
    runtime: &RuntimeConfig,
    fixed_container: Option<String>,
) -> Result<Arc<dyn ExecTransport>> {
    match runtime.backend {
        RuntimeBackend::Kubernetes => {
            let transport = KubeExecTransport::connect(runtime.kubeconfig.as_deref())
                .await
                .context("Failed to initialize Kubernetes exec transport")?;
            transport
                .healthcheck()
                .await
                .context("Kubernetes API healthcheck failed")?;
            info!("Kubernetes API server reachable, executing through pods/exec");
            Ok(Arc::new(transport))
        }
        RuntimeBackend::Docker => {
            let transport = DockerExecTransport::new(
                runtime.docker_socket_path.as_deref(),
                runtime.resolution,
                fixed_container,
            )
            .context("Failed to initialize Docker exec transport")?;
            transport
                .healthcheck()
                .await
                .context("Docker healthcheck failed")?;
            info!(
                "Docker daemon reachable, resolving targets by {:?}",
                runtime.resolution
            );
            Ok(Arc::new(transport))
        }
    }
}
