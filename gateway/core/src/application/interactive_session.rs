// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Interactive Session Handler
//!
//! Bridges one terminal-protocol session onto one remote command: the
//! session's stdio becomes the command's stdio, and the command's outcome
//! becomes the session's exit code.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Shell/exec sessions on top of the command channel

use crate::application::command_channel::RemoteCommandChannel;
use crate::domain::exec::{ExecError, ExecRequest, InputStream, OutputStream};
use crate::domain::target::{CommandVector, TargetIdentity};
use crate::domain::terminal::ResizeSequence;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Exit code reported when the session fails for any reason other than the
/// remote process exiting non-zero.
pub const SESSION_FAILURE_CODE: i32 = 1;

/// What the terminal-protocol server hands over for one session.
pub struct TerminalSession<'a> {
    /// Explicit command line; `None` or empty selects the default shell.
    pub command: Option<Vec<String>>,
    /// Present when the client requested a pty.
    pub pty: Option<ResizeSequence>,
    pub stdin: InputStream<'a>,
    pub stdout: OutputStream<'a>,
    pub stderr: OutputStream<'a>,
}

pub struct InteractiveSessionHandler {
    channel: RemoteCommandChannel,
    default_shell: CommandVector,
}

impl InteractiveSessionHandler {
    pub fn new(channel: RemoteCommandChannel, default_shell: CommandVector) -> Self {
        Self {
            channel,
            default_shell,
        }
    }

    /// Run the session to completion and return its exit code.
    pub async fn run(
        &self,
        target: &TargetIdentity,
        session: TerminalSession<'_>,
        cancel: &CancellationToken,
    ) -> i32 {
        let TerminalSession {
            command,
            pty,
            stdin,
            mut stdout,
            mut stderr,
        } = session;

        let command = match command {
            Some(args) if !args.is_empty() => CommandVector::new(args),
            _ => self.default_shell.clone(),
        };
        let with_pty = pty.is_some();
        info!(target_identity = %target, command = %command, pty = with_pty, "Starting session");

        let mut request = ExecRequest::new(target, &command)
            .stdin(stdin)
            .stdout(&mut stdout);
        request = match pty {
            Some(resize) => request.tty(Some(resize)),
            None => request.stderr(&mut stderr),
        };

        let code = match self.channel.execute(request, cancel).await {
            Ok(()) => 0,
            Err(err) => {
                let code = match &err {
                    ExecError::RemoteExit { code, .. } => *code,
                    _ => {
                        warn!(target_identity = %target, "Session failed: {}", err);
                        SESSION_FAILURE_CODE
                    }
                };
                let message = format!("{}\n", err);
                if let Err(e) = stdout.write_all(message.as_bytes()).await {
                    debug!("Could not report session error to client: {}", e);
                }
                code
            }
        };

        if let Err(e) = stdout.flush().await {
            debug!("Session output flush failed: {}", e);
        }
        info!(target_identity = %target, exit_code = code, "Session finished");
        code
    }
}
