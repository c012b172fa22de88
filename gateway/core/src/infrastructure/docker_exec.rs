// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Docker Exec Transport
//!
//! Runs commands inside pod containers through the Docker Engine exec API.
//! This backend only sees containers on the local engine. With
//! `kubelet-labels` resolution it finds pod containers by the
//! `io.kubernetes.*` labels dockershim and cri-dockerd put on them. With
//! `container-name` resolution it only ever targets the one fixed container
//! of the gateway configuration.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements the [`ExecTransport`] seam with `bollard`

use crate::domain::exec::{ExecRequest, ExecTransport, ExitStatus, TransportError};
use crate::domain::gateway_config::TargetResolution;
use crate::domain::target::TargetIdentity;
use crate::infrastructure::exec_pumps::{copy_stdin, forward_resizes, StdioAttach};
use async_trait::async_trait;
use bollard::container::{ListContainersOptions, LogOutput};
use bollard::exec::{CreateExecOptions, ResizeExecOptions, StartExecOptions, StartExecResults};
use bollard::Docker;
use futures::future::pending;
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

const LABEL_NAMESPACE: &str = "io.kubernetes.pod.namespace";
const LABEL_POD: &str = "io.kubernetes.pod.name";
const LABEL_CONTAINER: &str = "io.kubernetes.container.name";

/// Docker may still report an exec as running right after its stream
/// closed, and a process may close its stdio long before it exits.
const STATUS_POLL_INITIAL: Duration = Duration::from_millis(50);
const STATUS_POLL_MAX: Duration = Duration::from_secs(1);

pub struct DockerExecTransport {
    docker: Docker,
    resolution: TargetResolution,
    fixed_container: Option<String>,
}

impl DockerExecTransport {
    /// Connect to the Docker engine.
    ///
    /// `container-name` resolution requires `fixed_container`: the login
    /// name must never pick an arbitrary container on the engine.
    pub fn new(
        socket_path: Option<&str>,
        resolution: TargetResolution,
        fixed_container: Option<String>,
    ) -> Result<Self, TransportError> {
        if resolution == TargetResolution::ContainerName && fixed_container.is_none() {
            return Err(TransportError::Unavailable(
                "container-name resolution requires a fixed target container".to_string(),
            ));
        }

        let docker = if let Some(path) = socket_path {
            #[cfg(unix)]
            let result = Docker::connect_with_unix(path, 120, bollard::API_DEFAULT_VERSION);

            #[cfg(windows)]
            let result = Docker::connect_with_named_pipe(path, 120, bollard::API_DEFAULT_VERSION);

            result.map_err(|e| {
                TransportError::Unavailable(format!(
                    "Failed to connect to Docker at {}: {}\n\n\
                     Ensure Docker is running and the socket path is correct.",
                    path, e
                ))
            })?
        } else {
            Docker::connect_with_local_defaults().map_err(|e| {
                TransportError::Unavailable(format!(
                    "Failed to connect to Docker: {}\n\n\
                     Common causes:\n\
                     - Docker daemon not running (check: docker ps)\n\
                     - Permission denied accessing Docker socket\n\n\
                     Try:\n\
                     - Check permissions: ls -la /var/run/docker.sock\n\
                     - Set runtime.docker_socket_path in the gateway config",
                    e
                ))
            })?
        };

        Ok(Self {
            docker,
            resolution,
            fixed_container,
        })
    }

    /// Verify Docker daemon is accessible
    pub async fn healthcheck(&self) -> Result<(), TransportError> {
        self.docker.ping().await.map_err(|e| {
            TransportError::Unavailable(format!(
                "Cannot connect to Docker daemon: {}\n\n\
                 Verify with: docker ps",
                e
            ))
        })?;
        Ok(())
    }

    /// Find the running container backing `target`.
    pub async fn resolve(&self, target: &TargetIdentity) -> Result<String, TransportError> {
        match self.resolution {
            TargetResolution::ContainerName => {
                resolve_fixed(self.fixed_container.as_deref(), target)
            }
            TargetResolution::KubeletLabels => {
                let mut filters = HashMap::new();
                filters.insert(
                    "label".to_string(),
                    vec![
                        format!("{}={}", LABEL_NAMESPACE, target.namespace),
                        format!("{}={}", LABEL_POD, target.instance),
                        format!("{}={}", LABEL_CONTAINER, target.container),
                    ],
                );
                filters.insert("status".to_string(), vec!["running".to_string()]);

                let options = ListContainersOptions {
                    all: false,
                    filters,
                    ..Default::default()
                };
                let containers = self
                    .docker
                    .list_containers(Some(options))
                    .await
                    .map_err(|e| TransportError::Unavailable(e.to_string()))?;

                containers
                    .into_iter()
                    .find_map(|c| c.id)
                    .ok_or_else(|| TransportError::TargetNotFound(target.to_string()))
            }
        }
    }
}

fn resolve_fixed(fixed: Option<&str>, target: &TargetIdentity) -> Result<String, TransportError> {
    match fixed {
        Some(fixed) if fixed == target.container => Ok(fixed.to_string()),
        _ => Err(TransportError::TargetNotFound(target.to_string())),
    }
}

/// Options for `create_exec` under the shared stdio rules.
fn exec_options(attach: StdioAttach, command: Vec<String>) -> CreateExecOptions<String> {
    CreateExecOptions {
        attach_stdin: Some(attach.stdin),
        attach_stdout: Some(attach.stdout),
        attach_stderr: Some(attach.stderr),
        tty: Some(attach.tty),
        cmd: Some(command),
        ..Default::default()
    }
}

/// Route multiplexed exec frames to the client writers until the stream ends.
async fn route_frames<S, E, O, R>(
    mut frames: S,
    mut stdout: Option<&mut O>,
    mut stderr: Option<&mut R>,
) -> Result<(), TransportError>
where
    S: Stream<Item = Result<LogOutput, E>> + Unpin,
    E: Display,
    O: AsyncWrite + Unpin + ?Sized,
    R: AsyncWrite + Unpin + ?Sized,
{
    while let Some(frame) = frames.next().await {
        let frame = frame.map_err(|e| TransportError::Stream(e.to_string()))?;
        match frame {
            LogOutput::StdOut { message } | LogOutput::Console { message } => {
                if let Some(out) = stdout.as_deref_mut() {
                    out.write_all(&message).await?;
                }
            }
            LogOutput::StdErr { message } => {
                if let Some(err) = stderr.as_deref_mut() {
                    err.write_all(&message).await?;
                }
            }
            LogOutput::StdIn { .. } => {}
        }
    }
    if let Some(out) = stdout.as_deref_mut() {
        out.flush().await?;
    }
    if let Some(err) = stderr.as_deref_mut() {
        err.flush().await?;
    }
    Ok(())
}

/// Poll `inspect` until the exec is no longer running, backing off from
/// `initial` up to `max` between polls.
async fn poll_exit_status<F, Fut>(
    exec_id: &str,
    mut inspect: F,
    initial: Duration,
    max: Duration,
) -> Result<ExitStatus, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(Option<bool>, Option<i64>), TransportError>>,
{
    let mut interval = initial;
    loop {
        let (running, exit_code) = inspect().await?;
        if running != Some(true) {
            return match exit_code {
                Some(code) => Ok(ExitStatus::new(i32::try_from(code).unwrap_or(i32::MAX))),
                None => Err(TransportError::StatusUnavailable(exec_id.to_string())),
            };
        }
        tokio::time::sleep(interval).await;
        interval = (interval * 2).min(max);
    }
}

#[async_trait]
impl ExecTransport for DockerExecTransport {
    async fn exec(&self, request: ExecRequest<'_>) -> Result<ExitStatus, TransportError> {
        let attach = StdioAttach::for_request(&request);
        let ExecRequest {
            target,
            command,
            stdin,
            mut stdout,
            mut stderr,
            tty,
            resize,
        } = request;

        let container_id = self.resolve(target).await?;

        let exec = self
            .docker
            .create_exec(&container_id, exec_options(attach, command.to_vec()))
            .await
            .map_err(|e| TransportError::StartFailed(e.to_string()))?;

        let start_opts = StartExecOptions {
            detach: false,
            tty,
            ..Default::default()
        };

        let res = self
            .docker
            .start_exec(&exec.id, Some(start_opts))
            .await
            .map_err(|e| TransportError::StartFailed(e.to_string()))?;

        let StartExecResults::Attached { output, mut input } = res else {
            return Err(TransportError::StartFailed(format!(
                "exec {} started detached",
                exec.id
            )));
        };
        debug!(exec_id = %exec.id, container = %container_id, "Exec attached");

        let output_pump = route_frames(output, stdout.as_deref_mut(), stderr.as_deref_mut());

        // Runs until stdin ends, then half-closes and idles.
        let stdin_pump = async move {
            if let Some(mut source) = stdin {
                if let Err(e) = copy_stdin(&mut source, &mut input).await {
                    debug!("Exec stdin pump ended: {}", e);
                }
            }
            pending::<()>().await
        };

        let docker = &self.docker;
        let exec_id = exec.id.as_str();
        let resize_pump = async move {
            if let Some(sizes) = resize {
                forward_resizes(sizes, |size| {
                    docker.resize_exec(
                        exec_id,
                        ResizeExecOptions {
                            width: size.width,
                            height: size.height,
                        },
                    )
                })
                .await;
            }
            pending::<()>().await
        };

        tokio::select! {
            result = output_pump => result?,
            _ = stdin_pump => {}
            _ = resize_pump => {}
        }

        let status = poll_exit_status(
            exec_id,
            || async {
                let inspect = docker.inspect_exec(exec_id).await.map_err(|e| {
                    TransportError::Stream(format!("Failed to inspect exec: {}", e))
                })?;
                Ok((inspect.running, inspect.exit_code))
            },
            STATUS_POLL_INITIAL,
            STATUS_POLL_MAX,
        )
        .await?;
        debug!(exec_id, exit_code = status.code, "Exec finished");
        Ok(status)
    }
}
