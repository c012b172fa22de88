// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Exec stdio pumps shared by the cluster transports.
//!
//! Each transport attaches to a remote process differently, but the stdio
//! rules are the same: what gets attached for a request, how client input is
//! copied and half-closed, how output reaches the client, and how the
//! resize sequence reaches the remote terminal.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Transport-neutral stream plumbing behind [`ExecTransport`](crate::domain::exec::ExecTransport)

use crate::domain::exec::ExecRequest;
use crate::domain::terminal::{ResizeSequence, WindowSize};
use std::fmt::Display;
use std::future::Future;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Remote streams to attach for one exec.
///
/// Under a pty the remote side has a single output stream, so stdout is
/// always attached and stderr never is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StdioAttach {
    pub stdin: bool,
    pub stdout: bool,
    pub stderr: bool,
    pub tty: bool,
}

impl StdioAttach {
    pub fn for_request(request: &ExecRequest<'_>) -> Self {
        Self {
            stdin: request.stdin.is_some(),
            stdout: request.stdout.is_some() || request.tty,
            stderr: !request.tty,
            tty: request.tty,
        }
    }
}

/// Copy client input into the remote stdin, then half-close it so the
/// remote process sees end of input.
pub async fn copy_stdin<R, W>(source: &mut R, sink: &mut W) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let copied = tokio::io::copy(source, sink).await;
    let closed = sink.shutdown().await;
    let copied = copied?;
    closed?;
    Ok(copied)
}

/// Drain one remote output stream into the client writer.
///
/// An attached stream without a client writer is still drained so the
/// remote side never stalls on a full buffer.
pub async fn copy_output<R, W>(source: Option<R>, sink: Option<&mut W>) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    let Some(mut source) = source else {
        return Ok(());
    };
    match sink {
        Some(sink) => {
            tokio::io::copy(&mut source, sink).await?;
            sink.flush().await
        }
        None => {
            tokio::io::copy(&mut source, &mut tokio::io::sink()).await?;
            Ok(())
        }
    }
}

/// Apply every size of `sizes` to the remote terminal until the sequence
/// ends. A failed resize is logged and does not end the session.
pub async fn forward_resizes<F, Fut, E>(mut sizes: ResizeSequence, mut apply: F)
where
    F: FnMut(WindowSize) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    while let Some(size) = sizes.next().await {
        if let Err(e) = apply(size).await {
            debug!(
                width = size.width,
                height = size.height,
                "Terminal resize failed: {}",
                e
            );
        }
    }
}
