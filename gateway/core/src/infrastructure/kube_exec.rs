// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Kubernetes Exec Transport
//!
//! Runs commands through the cluster API server's `pods/<pod>/exec`
//! subresource, so the target pod can live on any node and behind any
//! container runtime.
//!
//! Client configuration comes from an explicit kubeconfig path when one is
//! set, otherwise from `KUBECONFIG`, `~/.kube/config` or the in-cluster
//! service account, in that order.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements the [`ExecTransport`] seam with `kube`

use crate::domain::exec::{ExecRequest, ExecTransport, ExitStatus, TransportError};
use crate::domain::target::TargetIdentity;
use crate::infrastructure::exec_pumps::{copy_output, copy_stdin, forward_resizes, StdioAttach};
use async_trait::async_trait;
use futures::future::pending;
use futures::SinkExt;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::{AttachParams, TerminalSize};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use tracing::debug;

const STATUS_SUCCESS: &str = "Success";
const REASON_NON_ZERO_EXIT: &str = "NonZeroExitCode";
const CAUSE_EXIT_CODE: &str = "ExitCode";

pub struct KubeExecTransport {
    client: Client,
}

impl KubeExecTransport {
    /// Build a cluster client from `kubeconfig`, or from the default chain.
    pub async fn connect(kubeconfig: Option<&str>) -> Result<Self, TransportError> {
        let client = match kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    TransportError::Unavailable(format!(
                        "Failed to read kubeconfig {}: {}",
                        path, e
                    ))
                })?;
                let config =
                    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                        .await
                        .map_err(|e| {
                            TransportError::Unavailable(format!(
                                "Invalid kubeconfig {}: {}",
                                path, e
                            ))
                        })?;
                Client::try_from(config)
                    .map_err(|e| TransportError::Unavailable(e.to_string()))?
            }
            None => Client::try_default().await.map_err(|e| {
                TransportError::Unavailable(format!(
                    "Failed to load Kubernetes client configuration: {}\n\n\
                     Try:\n\
                     - Set KUBECONFIG or pass --kubeconfig\n\
                     - Run inside the cluster with a service account allowed to create pods/exec",
                    e
                ))
            })?,
        };
        Ok(Self { client })
    }

    /// Verify the API server is reachable
    pub async fn healthcheck(&self) -> Result<(), TransportError> {
        let version = self.client.apiserver_version().await.map_err(|e| {
            TransportError::Unavailable(format!(
                "Cannot reach Kubernetes API server: {}\n\n\
                 Verify with: kubectl version",
                e
            ))
        })?;
        debug!(version = %version.git_version, "Kubernetes API server reachable");
        Ok(())
    }
}

fn attach_params(attach: StdioAttach, target: &TargetIdentity) -> AttachParams {
    AttachParams {
        container: Some(target.container.clone()),
        stdin: attach.stdin,
        stdout: attach.stdout,
        stderr: attach.stderr,
        tty: attach.tty,
        ..Default::default()
    }
}

/// Exit code carried by the exec status message of the API server.
fn exit_code(status: &Status) -> Result<i32, TransportError> {
    if status.status.as_deref() == Some(STATUS_SUCCESS) {
        return Ok(0);
    }
    if status.reason.as_deref() == Some(REASON_NON_ZERO_EXIT) {
        let code = status
            .details
            .as_ref()
            .and_then(|details| details.causes.as_ref())
            .and_then(|causes| {
                causes
                    .iter()
                    .find(|cause| cause.reason.as_deref() == Some(CAUSE_EXIT_CODE))
            })
            .and_then(|cause| cause.message.as_deref())
            .and_then(|message| message.trim().parse::<i32>().ok());
        if let Some(code) = code {
            return Ok(code);
        }
    }
    Err(TransportError::Stream(
        status
            .message
            .clone()
            .unwrap_or_else(|| "exec ended without an exit code".to_string()),
    ))
}

fn start_error(target: &TargetIdentity, error: kube::Error) -> TransportError {
    match error {
        kube::Error::Api(response) if response.code == 404 => {
            TransportError::TargetNotFound(target.to_string())
        }
        other => TransportError::StartFailed(other.to_string()),
    }
}

#[async_trait]
impl ExecTransport for KubeExecTransport {
    async fn exec(&self, request: ExecRequest<'_>) -> Result<ExitStatus, TransportError> {
        let attach = StdioAttach::for_request(&request);
        let ExecRequest {
            target,
            command,
            stdin,
            mut stdout,
            mut stderr,
            tty: _,
            resize,
        } = request;

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &target.namespace);
        let mut process = pods
            .exec(&target.instance, command.to_vec(), &attach_params(attach, target))
            .await
            .map_err(|e| start_error(target, e))?;
        debug!(target_identity = %target, command = %command, "Exec attached");

        let status = process.take_status();
        let terminal_size = process.terminal_size();
        let remote_stdin = process.stdin();
        let remote_stdout = process.stdout();
        let remote_stderr = process.stderr();

        let output_pump = async {
            tokio::try_join!(
                copy_output(remote_stdout, stdout.as_deref_mut()),
                copy_output(remote_stderr, stderr.as_deref_mut()),
            )?;
            Ok::<(), TransportError>(())
        };

        // Runs until stdin ends, then half-closes and idles.
        let stdin_pump = async move {
            if let (Some(mut source), Some(mut sink)) = (stdin, remote_stdin) {
                if let Err(e) = copy_stdin(&mut source, &mut sink).await {
                    debug!("Exec stdin pump ended: {}", e);
                }
            }
            pending::<()>().await
        };

        let resize_pump = async move {
            if let (Some(sizes), Some(sender)) = (resize, terminal_size) {
                forward_resizes(sizes, |size| {
                    let mut sender = sender.clone();
                    async move {
                        sender
                            .send(TerminalSize {
                                width: size.width,
                                height: size.height,
                            })
                            .await
                    }
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

        let status = match status {
            Some(status) => status.await,
            None => None,
        }
        .ok_or_else(|| TransportError::StatusUnavailable(target.to_string()))?;
        let code = exit_code(&status)?;

        if let Err(e) = process.join().await {
            debug!("Exec connection closed with error: {}", e);
        }
        debug!(target_identity = %target, exit_code = code, "Exec finished");
        Ok(ExitStatus::new(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{StatusCause, StatusDetails};

    fn failure(reason: &str, causes: Vec<StatusCause>) -> Status {
        Status {
            status: Some("Failure".to_string()),
            reason: Some(reason.to_string()),
            message: Some("command terminated with non-zero exit code".to_string()),
            details: Some(StatusDetails {
                causes: Some(causes),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn exit_cause(code: &str) -> StatusCause {
        StatusCause {
            reason: Some(CAUSE_EXIT_CODE.to_string()),
            message: Some(code.to_string()),
            field: None,
        }
    }

    #[test]
    fn test_success_status_is_exit_zero() {
        let status = Status {
            status: Some(STATUS_SUCCESS.to_string()),
            ..Default::default()
        };
        assert_eq!(exit_code(&status).unwrap(), 0);
    }

    #[test]
    fn test_non_zero_exit_code_is_decoded() {
        let status = failure(REASON_NON_ZERO_EXIT, vec![exit_cause("127")]);
        assert_eq!(exit_code(&status).unwrap(), 127);
    }

    #[test]
    fn test_failure_without_exit_code_is_stream_error() {
        let status = Status {
            status: Some("Failure".to_string()),
            reason: Some("InternalError".to_string()),
            message: Some("container not running".to_string()),
            ..Default::default()
        };
        let err = exit_code(&status).unwrap_err();
        assert!(matches!(err, TransportError::Stream(ref m) if m == "container not running"));

        let garbled = failure(REASON_NON_ZERO_EXIT, vec![exit_cause("n/a")]);
        assert!(exit_code(&garbled).is_err());
    }

    #[test]
    fn test_attach_params_select_container_and_streams() {
        let target = TargetIdentity::new("shop", "checkout-7d9f", "app");
        let params = attach_params(
            StdioAttach {
                stdin: true,
                stdout: true,
                stderr: false,
                tty: true,
            },
            &target,
        );

        assert_eq!(params.container.as_deref(), Some("app"));
        assert!(params.stdin);
        assert!(params.stdout);
        assert!(!params.stderr);
        assert!(params.tty);
    }
}
