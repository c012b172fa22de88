// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Gateway Configuration Types
//
// Defines the configuration schema for a podgate instance, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - The single target pod (namespace, instance, optional fixed container)
// - SSH listener and host key settings
// - Exec backend: Kubernetes API (kubeconfig) or local Docker engine
// - Session defaults, spool directory and observability settings

use crate::domain::target::TargetSelector;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const API_VERSION: &str = "podgate.dev/v1";
pub const KIND: &str = "GatewayConfig";

/// Top-level Kubernetes-style gateway configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfigManifest {
    /// API version (must be "podgate.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "GatewayConfig")
    pub kind: String,

    /// Gateway metadata
    pub metadata: ManifestMetadata,

    /// Gateway configuration specification
    pub spec: GatewayConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable gateway name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfigSpec {
    /// The pod every session is bridged into
    #[serde(default)]
    pub target: TargetConfig,

    #[serde(default)]
    pub listen: ListenConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub spool: SpoolConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default)]
    pub namespace: String,

    /// Pod name
    #[serde(default)]
    pub instance: String,

    /// Fixed container. When unset, the SSH login name selects the container.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// OpenSSH private key used as the server host key
    #[serde(default = "default_host_key_path")]
    pub host_key_path: String,

    /// Drop idle connections after this many seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inactivity_timeout_secs: Option<u64>,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_ssh_port(),
            host_key_path: default_host_key_path(),
            inactivity_timeout_secs: None,
        }
    }
}

/// Where remote commands are executed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeBackend {
    /// `pods/<pod>/exec` through the cluster API server
    #[default]
    Kubernetes,
    /// Exec API of the local Docker engine
    Docker,
}

impl FromStr for RuntimeBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kubernetes" => Ok(RuntimeBackend::Kubernetes),
            "docker" => Ok(RuntimeBackend::Docker),
            other => Err(format!(
                "unknown runtime backend '{}': expected kubernetes or docker",
                other
            )),
        }
    }
}

/// How a target identity is located on the Docker engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetResolution {
    /// Match the io.kubernetes.* labels the kubelet puts on pod containers
    #[default]
    KubeletLabels,
    /// Use the fixed target container as the Docker container name
    ContainerName,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub backend: RuntimeBackend,

    /// Kubeconfig for the kubernetes backend
    /// Default: KUBECONFIG, ~/.kube/config, then the in-cluster service account
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<String>,

    /// Path to Docker socket (docker backend)
    /// Default: auto-detect (DOCKER_HOST or /var/run/docker.sock)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_socket_path: Option<String>,

    #[serde(default)]
    pub resolution: TargetResolution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Command run when the client does not send one
    #[serde(default = "default_shell")]
    pub default_shell: Vec<String>,

    /// UTC offset of the container clock in seconds, used to render
    /// `touch -t` stamps (containers run in UTC unless TZ is set)
    #[serde(default)]
    pub remote_utc_offset_secs: i32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_shell: default_shell(),
            remote_utc_offset_secs: 0,
        }
    }
}

impl SessionConfig {
    pub fn remote_offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.remote_utc_offset_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpoolConfig {
    /// Directory for read spool files (default: system temp dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Prometheus scrape port
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_ssh_port() -> u16 {
    2222
}

fn default_host_key_path() -> String {
    "/etc/podgate/ssh_host_ed25519_key".to_string()
}

fn default_shell() -> Vec<String> {
    vec!["sh".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for GatewayConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "podgate".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
            },
            spec: GatewayConfigSpec::default(),
        }
    }
}

impl GatewayConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. PODGATE_CONFIG_PATH environment variable
    /// 2. ./podgate-config.yaml (working directory)
    /// 3. ~/.podgate/config.yaml (user home)
    /// 4. /etc/podgate/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("PODGATE_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./podgate-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".podgate").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/podgate/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing/invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    /// This allows container deployments to override config via env vars
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PODGATE_NAMESPACE") {
            tracing::info!("Environment override: PODGATE_NAMESPACE={}", val);
            self.spec.target.namespace = val;
        }
        if let Ok(val) = std::env::var("PODGATE_INSTANCE") {
            tracing::info!("Environment override: PODGATE_INSTANCE={}", val);
            self.spec.target.instance = val;
        }
        if let Ok(val) = std::env::var("PODGATE_CONTAINER") {
            tracing::info!("Environment override: PODGATE_CONTAINER={}", val);
            self.spec.target.container = if val.is_empty() { None } else { Some(val) };
        }
        if let Ok(val) = std::env::var("PODGATE_KUBECONFIG") {
            tracing::info!("Environment override: PODGATE_KUBECONFIG={}", val);
            self.spec.runtime.kubeconfig = if val.is_empty() { None } else { Some(val) };
        }
        if let Ok(val) = std::env::var("PODGATE_RUNTIME") {
            match val.parse::<RuntimeBackend>() {
                Ok(backend) => {
                    tracing::info!("Environment override: PODGATE_RUNTIME={}", val);
                    self.spec.runtime.backend = backend;
                }
                Err(e) => tracing::warn!("Invalid value for PODGATE_RUNTIME: {}. Ignoring.", e),
            }
        }
        if let Ok(val) = std::env::var("PODGATE_PORT") {
            match val.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Environment override: PODGATE_PORT={}", port);
                    self.spec.listen.port = port;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for PODGATE_PORT: '{}'. Expected a port number. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.target.namespace.is_empty() {
            anyhow::bail!("spec.target.namespace cannot be empty");
        }

        if self.spec.target.instance.is_empty() {
            anyhow::bail!("spec.target.instance cannot be empty");
        }

        if matches!(&self.spec.target.container, Some(c) if c.is_empty()) {
            anyhow::bail!("spec.target.container cannot be empty when set");
        }

        if self.spec.listen.port == 0 {
            anyhow::bail!("spec.listen.port cannot be 0");
        }

        if self.spec.session.default_shell.is_empty() {
            anyhow::bail!("spec.session.default_shell must name at least the executable");
        }

        if self.spec.session.remote_offset().is_none() {
            anyhow::bail!(
                "spec.session.remote_utc_offset_secs must be within one day, got {}",
                self.spec.session.remote_utc_offset_secs
            );
        }

        if self.spec.runtime.backend == RuntimeBackend::Docker
            && self.spec.runtime.resolution == TargetResolution::ContainerName
            && self.spec.target.container.is_none()
        {
            anyhow::bail!(
                "spec.runtime.resolution 'container-name' requires spec.target.container"
            );
        }

        Ok(())
    }

    pub fn target_selector(&self) -> TargetSelector {
        TargetSelector::new(
            self.spec.target.namespace.clone(),
            self.spec.target.instance.clone(),
            self.spec.target.container.clone(),
        )
    }
}
