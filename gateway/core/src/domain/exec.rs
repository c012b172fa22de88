// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Exec contracts: the request handed to a transport, the transport seam
//! itself, and the error taxonomy of a remote command.

use crate::domain::target::{CommandVector, TargetIdentity};
use crate::domain::terminal::ResizeSequence;
use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

pub type InputStream<'a> = Box<dyn AsyncRead + Send + Unpin + 'a>;
pub type OutputStream<'a> = Box<dyn AsyncWrite + Send + Unpin + 'a>;

/// One remote execution: where, what, and how its stdio is wired.
///
/// A stream left as `None` is not attached on the remote side.
pub struct ExecRequest<'a> {
    pub target: &'a TargetIdentity,
    pub command: &'a CommandVector,
    pub stdin: Option<InputStream<'a>>,
    pub stdout: Option<OutputStream<'a>>,
    pub stderr: Option<OutputStream<'a>>,
    pub tty: bool,
    pub resize: Option<ResizeSequence>,
}

impl<'a> ExecRequest<'a> {
    pub fn new(target: &'a TargetIdentity, command: &'a CommandVector) -> Self {
        Self {
            target,
            command,
            stdin: None,
            stdout: None,
            stderr: None,
            tty: false,
            resize: None,
        }
    }

    pub fn stdin(mut self, stdin: impl AsyncRead + Send + Unpin + 'a) -> Self {
        self.stdin = Some(Box::new(stdin));
        self
    }

    pub fn stdout(mut self, stdout: impl AsyncWrite + Send + Unpin + 'a) -> Self {
        self.stdout = Some(Box::new(stdout));
        self
    }

    pub fn stderr(mut self, stderr: impl AsyncWrite + Send + Unpin + 'a) -> Self {
        self.stderr = Some(Box::new(stderr));
        self
    }

    /// Request a pseudo-terminal. Under a pty stderr is merged into stdout.
    pub fn tty(mut self, resize: Option<ResizeSequence>) -> Self {
        self.tty = true;
        self.resize = resize;
        self
    }
}

/// Final status reported by the transport once the remote process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: i32,
}

impl ExitStatus {
    pub fn new(code: i32) -> Self {
        Self { code }
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    #[error("target not found: {0}")]
    TargetNotFound(String),

    #[error("failed to start exec: {0}")]
    StartFailed(String),

    #[error("exec stream failed: {0}")]
    Stream(String),

    #[error("exit status unavailable for exec {0}")]
    StatusUnavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("{}", remote_exit_message(*code, stderr))]
    RemoteExit { code: i32, stderr: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("exec cancelled")]
    Cancelled,
}

impl ExecError {
    /// Exit code of the remote process, if it ran to a non-zero exit.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecError::RemoteExit { code, .. } => Some(*code),
            _ => None,
        }
    }
}

fn remote_exit_message(code: i32, stderr: &str) -> String {
    let stderr = stderr.trim_end();
    if stderr.is_empty() {
        format!("command terminated with exit code {}", code)
    } else {
        format!("command terminated with exit code {}\n{}", code, stderr)
    }
}

/// Cluster execution transport: runs one command inside the target
/// container and streams its stdio until the remote process ends.
#[async_trait]
pub trait ExecTransport: Send + Sync {
    async fn exec(&self, request: ExecRequest<'_>) -> Result<ExitStatus, TransportError>;
}
