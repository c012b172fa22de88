// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Remote Command Channel
//!
//! Runs exactly one command in the target container per call and turns the
//! transport's final status into the gateway's error taxonomy.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Exec-stream bridge between protocol handlers and the transport

use crate::domain::exec::{ExecError, ExecRequest, ExecTransport, OutputStream};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Shared handle on the cluster execution transport.
///
/// Cheap to clone; the transport itself is shared read-only.
#[derive(Clone)]
pub struct RemoteCommandChannel {
    transport: Arc<dyn ExecTransport>,
}

impl RemoteCommandChannel {
    pub fn new(transport: Arc<dyn ExecTransport>) -> Self {
        Self { transport }
    }

    /// Execute `request`, suspending until the remote process ends, the
    /// transport fails, or `cancel` fires.
    ///
    /// With a pty, stderr is merged into stdout and any stderr endpoint is
    /// dropped. Without a pty and without a stderr endpoint, stderr is
    /// captured and attached to [`ExecError::RemoteExit`].
    pub async fn execute(
        &self,
        request: ExecRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), ExecError> {
        let ExecRequest {
            target,
            command,
            stdin,
            stdout,
            stderr,
            tty,
            resize,
        } = request;

        let mut captured = Vec::new();
        let stderr: Option<OutputStream<'_>> = match (tty, stderr) {
            (true, _) => None,
            (false, Some(stderr)) => Some(stderr),
            (false, None) => Some(Box::new(&mut captured)),
        };
        let request = ExecRequest {
            target,
            command,
            stdin,
            stdout,
            stderr,
            tty,
            resize,
        };

        debug!(target_identity = %target, command = %command, tty, "Opening remote exec");
        let started = Instant::now();

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(command = %command, "Remote exec cancelled");
                record_outcome("cancelled", started);
                return Err(ExecError::Cancelled);
            }
            outcome = self.transport.exec(request) => outcome,
        };

        let status = match outcome {
            Ok(status) => status,
            Err(e) => {
                warn!(command = %command, "Remote exec transport failed: {}", e);
                record_outcome("transport_error", started);
                return Err(e.into());
            }
        };

        if status.success() {
            record_outcome("success", started);
            return Ok(());
        }

        debug!(command = %command, code = status.code, "Remote exec exited non-zero");
        record_outcome("remote_exit", started);
        Err(ExecError::RemoteExit {
            code: status.code,
            stderr: String::from_utf8_lossy(&captured).into_owned(),
        })
    }
}

fn record_outcome(outcome: &'static str, started: Instant) {
    metrics::counter!("podgate_exec_total", "outcome" => outcome).increment(1);
    metrics::histogram!("podgate_exec_duration_seconds").record(started.elapsed().as_secs_f64());
}
