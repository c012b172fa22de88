// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! SSH Server Implementation
//!
//! One `russh` listener serves both interactive sessions and the `sftp`
//! subsystem on the same port.
//!
//! ## Session flow
//! - Authentication is accepted for any user; the login name selects the
//!   target container through [`TargetSelector::resolve`].
//! - `pty-req` records the initial window and opens the resize notifier,
//!   `window-change` publishes new sizes to it. A `window-change` on a
//!   channel without a pty is ignored.
//! - `shell` / `exec` spawn one [`InteractiveSessionHandler`] run. Its
//!   stdout and stderr are pumped into channel data and extended data, and
//!   the exit code goes out as `exit-status` before EOF and close.
//! - `subsystem sftp` hands the channel stream to [`SftpSession`].
//!
//! Every channel owns a child token of the connection token; closing the
//! channel or dropping the connection cancels the remote commands behind it.

use crate::application::command_channel::RemoteCommandChannel;
use crate::application::file_translator::FileOperationTranslator;
use crate::application::interactive_session::{InteractiveSessionHandler, TerminalSession};
use crate::domain::gateway_config::ListenConfig;
use crate::domain::target::{CommandVector, TargetIdentity, TargetSelector};
use crate::domain::terminal::{ResizeNotifier, ResizeSequence, WindowSize};
use crate::presentation::ssh::sftp::SftpSession;
use async_trait::async_trait;
use chrono::{FixedOffset, Offset, Utc};
use russh::server::{Auth, Config, Handle, Handler, Msg, Server, Session};
use russh::{Channel, ChannelId, CryptoVec, Pty};
use russh_keys::key;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, DuplexStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Buffer between a remote command's output and the SSH channel.
const PIPE_CAPACITY: usize = 32 * 1024;

/// SSH extended data type for stderr.
const EXTENDED_DATA_STDERR: u32 = 1;

#[derive(Debug, Error)]
pub enum GatewayServerError {
    #[error("SSH protocol error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("Failed to load host key from {path}: {error}")]
    HostKey { path: String, error: String },

    #[error("Failed to bind to {address}: {error}")]
    BindFailed { address: String, error: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Listener-level state shared by every connection.
#[derive(Clone)]
pub struct SshGatewayServer {
    selector: TargetSelector,
    channel: RemoteCommandChannel,
    sessions: Arc<InteractiveSessionHandler>,
    spool_dir: Option<PathBuf>,
    remote_offset: FixedOffset,
    shutdown: CancellationToken,
}

impl SshGatewayServer {
    pub fn new(
        selector: TargetSelector,
        channel: RemoteCommandChannel,
        default_shell: CommandVector,
    ) -> Self {
        let sessions = Arc::new(InteractiveSessionHandler::new(channel.clone(), default_shell));
        Self {
            selector,
            channel,
            sessions,
            spool_dir: None,
            remote_offset: Utc.fix(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_spool_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.spool_dir = dir;
        self
    }

    /// UTC offset of the container clock, for SFTP mtime changes.
    pub fn with_remote_offset(mut self, offset: FixedOffset) -> Self {
        self.remote_offset = offset;
        self
    }

    /// Accept connections until `shutdown` fires or the listener fails.
    pub async fn serve(
        mut self,
        listen: &ListenConfig,
        shutdown: CancellationToken,
    ) -> Result<(), GatewayServerError> {
        let host_key = load_host_key(Path::new(&listen.host_key_path))?;
        let config = Arc::new(Config {
            inactivity_timeout: listen.inactivity_timeout_secs.map(Duration::from_secs),
            auth_rejection_time: Duration::from_secs(1),
            auth_rejection_time_initial: Some(Duration::from_secs(0)),
            keys: vec![host_key],
            ..Default::default()
        });

        let address = format!("{}:{}", listen.bind_address, listen.port);
        self.shutdown = shutdown.clone();
        info!("SSH gateway listening on {}", address);
        warn!("Client authentication is not enforced; restrict access to the listener at the network level");

        tokio::select! {
            result = self.run_on_address(config, address.as_str()) => {
                result.map_err(|e| GatewayServerError::BindFailed {
                    address: address.clone(),
                    error: e.to_string(),
                })?;
            }
            _ = shutdown.cancelled() => {
                info!("SSH gateway shutting down");
            }
        }
        Ok(())
    }
}

/// Load the OpenSSH-format private host key at `path`.
pub fn load_host_key(path: &Path) -> Result<key::KeyPair, GatewayServerError> {
    russh_keys::load_secret_key(path, None).map_err(|e| GatewayServerError::HostKey {
        path: path.display().to_string(),
        error: format!(
            "{}\n\nGenerate one with: ssh-keygen -t ed25519 -N '' -f {}",
            e,
            path.display()
        ),
    })
}

impl Server for SshGatewayServer {
    type Handler = ConnectionHandler;

    fn new_client(&mut self, peer_addr: Option<SocketAddr>) -> ConnectionHandler {
        debug!("SSH connection from {:?}", peer_addr);
        ConnectionHandler {
            server: self.clone(),
            peer_addr,
            target: None,
            channels: HashMap::new(),
            connection: self.shutdown.child_token(),
        }
    }

    fn handle_session_error(&mut self, error: GatewayServerError) {
        warn!("SSH session error: {}", error);
    }
}

/// Pty geometry of one session channel.
///
/// Only a `pty-req` makes the channel a pty session; window changes before
/// the command starts update the initial size, later ones go to the
/// running exec.
#[derive(Debug, Default)]
pub(crate) struct TerminalGeometry {
    window: Option<WindowSize>,
    resize: Option<ResizeNotifier>,
}

impl TerminalGeometry {
    pub(crate) fn pty_requested(&mut self, size: WindowSize) {
        self.window = Some(size);
        if let Some(notifier) = &self.resize {
            notifier.notify(size);
        }
    }

    /// Returns false when the channel has no pty.
    pub(crate) fn window_changed(&mut self, size: WindowSize) -> bool {
        if self.window.is_none() {
            return false;
        }
        match &self.resize {
            Some(notifier) => notifier.notify(size),
            None => self.window = Some(size),
        }
        true
    }

    /// Resize sequence for the command about to start, if this is a pty session.
    pub(crate) fn start(&mut self) -> Option<ResizeSequence> {
        let window = self.window?;
        let (notifier, sizes) = ResizeSequence::channel(window);
        self.resize = Some(notifier);
        Some(sizes)
    }
}

/// Per-channel state collected before the shell, exec or subsystem request.
struct ChannelState {
    channel: Option<Channel<Msg>>,
    terminal: TerminalGeometry,
    cancel: CancellationToken,
}

pub struct ConnectionHandler {
    server: SshGatewayServer,
    peer_addr: Option<SocketAddr>,
    target: Option<TargetIdentity>,
    channels: HashMap<ChannelId, ChannelState>,
    connection: CancellationToken,
}

impl ConnectionHandler {
    fn authenticate(&mut self, user: &str) -> Auth {
        let target = self.server.selector.resolve(user);
        info!(
            peer = ?self.peer_addr,
            user,
            target_identity = %target,
            "SSH login accepted"
        );
        self.target = Some(target);
        Auth::Accept
    }

    fn start_terminal(
        &mut self,
        id: ChannelId,
        command: Option<Vec<String>>,
        session: &mut Session,
    ) -> bool {
        let Some(target) = self.target.clone() else {
            return false;
        };
        let Some(state) = self.channels.get_mut(&id) else {
            return false;
        };
        let Some(channel) = state.channel.take() else {
            return false;
        };

        let pty = state.terminal.start();
        let cancel = state.cancel.clone();
        let sessions = self.server.sessions.clone();
        let handle = session.handle();
        metrics::counter!("podgate_sessions_total", "kind" => "terminal").increment(1);

        tokio::spawn(async move {
            // The write half stays alive until exit-status has gone out.
            let (reader, _writer) = tokio::io::split(channel.into_stream());
            let (stdout, stdout_rx) = tokio::io::duplex(PIPE_CAPACITY);
            let (stderr, stderr_rx) = tokio::io::duplex(PIPE_CAPACITY);
            let terminal = TerminalSession {
                command,
                pty,
                stdin: Box::new(reader),
                stdout: Box::new(stdout),
                stderr: Box::new(stderr),
            };

            let (code, _, _) = tokio::join!(
                sessions.run(&target, terminal, &cancel),
                forward_output(handle.clone(), id, None, stdout_rx),
                forward_output(handle.clone(), id, Some(EXTENDED_DATA_STDERR), stderr_rx),
            );

            let status = u32::try_from(code).unwrap_or(u32::from(u8::MAX));
            if handle.exit_status_request(id, status).await.is_err() {
                debug!("Client went away before exit status");
            }
            let _ = handle.eof(id).await;
            let _ = handle.close(id).await;
        });
        true
    }

    fn start_sftp(&mut self, id: ChannelId) -> bool {
        let Some(target) = self.target.clone() else {
            return false;
        };
        let Some(state) = self.channels.get_mut(&id) else {
            return false;
        };
        let Some(channel) = state.channel.take() else {
            return false;
        };

        let mut translator = FileOperationTranslator::new(self.server.channel.clone(), target)
            .with_remote_offset(self.server.remote_offset);
        if let Some(dir) = &self.server.spool_dir {
            translator = translator.with_spool_dir(dir.clone());
        }
        let sftp = SftpSession::new(translator, state.cancel.clone());
        metrics::counter!("podgate_sessions_total", "kind" => "sftp").increment(1);

        tokio::spawn(async move {
            russh_sftp::server::run(channel.into_stream(), sftp).await;
        });
        true
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        self.connection.cancel();
    }
}

#[async_trait]
impl Handler for ConnectionHandler {
    type Error = GatewayServerError;

    async fn auth_none(&mut self, user: &str) -> Result<Auth, Self::Error> {
        Ok(self.authenticate(user))
    }

    async fn auth_password(&mut self, user: &str, _password: &str) -> Result<Auth, Self::Error> {
        Ok(self.authenticate(user))
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        _public_key: &key::PublicKey,
    ) -> Result<Auth, Self::Error> {
        Ok(self.authenticate(user))
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        debug!("SSH session channel opened: {:?}", channel.id());
        self.channels.insert(
            channel.id(),
            ChannelState {
                cancel: self.connection.child_token(),
                channel: Some(channel),
                terminal: TerminalGeometry::default(),
            },
        );
        Ok(true)
    }

    #[allow(clippy::too_many_arguments)]
    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        debug!("PTY request: term={}, {}x{}", term, col_width, row_height);
        match self.channels.get_mut(&channel) {
            Some(state) => {
                state
                    .terminal
                    .pty_requested(WindowSize::from_cells(col_width, row_height));
                let _ = session.channel_success(channel);
            }
            None => {
                let _ = session.channel_failure(channel);
            }
        }
        Ok(())
    }

    async fn window_change_request(
        &mut self,
        channel: ChannelId,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(state) = self.channels.get_mut(&channel) {
            let size = WindowSize::from_cells(col_width, row_height);
            if !state.terminal.window_changed(size) {
                debug!("Ignoring window-change without pty on {:?}", channel);
            }
        }
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if self.start_terminal(channel, None, session) {
            let _ = session.channel_success(channel);
        } else {
            let _ = session.channel_failure(channel);
        }
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let line = String::from_utf8_lossy(data);
        let Some(command) = shlex::split(&line) else {
            warn!("Refusing unparsable exec request: {:?}", line);
            let _ = session.channel_failure(channel);
            return Ok(());
        };

        if self.start_terminal(channel, Some(command), session) {
            let _ = session.channel_success(channel);
        } else {
            let _ = session.channel_failure(channel);
        }
        Ok(())
    }

    async fn subsystem_request(
        &mut self,
        channel: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if name == "sftp" && self.start_sftp(channel) {
            let _ = session.channel_success(channel);
        } else {
            debug!("Rejecting subsystem request: {}", name);
            let _ = session.channel_failure(channel);
        }
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(state) = self.channels.remove(&channel) {
            state.cancel.cancel();
        }
        Ok(())
    }
}

async fn forward_output(
    handle: Handle,
    id: ChannelId,
    extended: Option<u32>,
    mut source: DuplexStream,
) {
    let mut buf = vec![0u8; PIPE_CAPACITY];
    loop {
        let n = match source.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!("Session output pump ended: {}", e);
                break;
            }
        };
        let data = CryptoVec::from_slice(&buf[..n]);
        let sent = match extended {
            Some(code) => handle.extended_data(id, code, data).await,
            None => handle.data(id, data).await,
        };
        if sent.is_err() {
            break;
        }
    }
}
