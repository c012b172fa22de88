// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Scripted in-memory exec transport shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use podgate_core::domain::exec::{ExecRequest, ExecTransport, ExitStatus, TransportError};
use podgate_core::domain::target::TargetIdentity;
use podgate_core::domain::terminal::WindowSize;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// What the fake remote process does for one command.
#[derive(Debug, Clone)]
pub enum Reply {
    Exit {
        stdout: Vec<u8>,
        stderr: Vec<u8>,
        code: i32,
    },
    /// Emit `stdout`, then never finish.
    Hang { stdout: Vec<u8> },
    /// The transport itself fails.
    Fail(String),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Exit {
            stdout: Vec::new(),
            stderr: Vec::new(),
            code: 0,
        }
    }

    pub fn stdout(bytes: impl Into<Vec<u8>>) -> Self {
        Reply::Exit {
            stdout: bytes.into(),
            stderr: Vec::new(),
            code: 0,
        }
    }

    pub fn exit(code: i32, stderr: &str) -> Self {
        Reply::Exit {
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
            code,
        }
    }
}

/// One exec as the transport saw it.
#[derive(Debug, Clone)]
pub struct RecordedExec {
    pub target: TargetIdentity,
    pub command: Vec<String>,
    pub stdin: Vec<u8>,
    pub stdout_wired: bool,
    pub stderr_wired: bool,
    pub tty: bool,
    pub initial_window: Option<WindowSize>,
}

type Script = dyn Fn(&[String]) -> Reply + Send + Sync;

pub struct ScriptedTransport {
    script: Box<Script>,
    calls: Mutex<Vec<RecordedExec>>,
}

impl ScriptedTransport {
    pub fn new(script: impl Fn(&[String]) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn always(reply: Reply) -> Arc<Self> {
        Self::new(move |_| reply.clone())
    }

    pub fn calls(&self) -> Vec<RecordedExec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<Vec<String>> {
        self.calls().into_iter().map(|c| c.command).collect()
    }
}

#[async_trait]
impl ExecTransport for ScriptedTransport {
    async fn exec(&self, request: ExecRequest<'_>) -> Result<ExitStatus, TransportError> {
        let ExecRequest {
            target,
            command,
            stdin,
            mut stdout,
            mut stderr,
            tty,
            resize,
        } = request;

        let mut input = Vec::new();
        if let Some(mut source) = stdin {
            source.read_to_end(&mut input).await?;
        }
        let initial_window = match resize {
            Some(mut sizes) => sizes.next().await,
            None => None,
        };

        self.calls.lock().unwrap().push(RecordedExec {
            target: target.clone(),
            command: command.to_vec(),
            stdin: input,
            stdout_wired: stdout.is_some(),
            stderr_wired: stderr.is_some(),
            tty,
            initial_window,
        });

        match (self.script)(command.args()) {
            Reply::Exit {
                stdout: out,
                stderr: err,
                code,
            } => {
                if let Some(sink) = stdout.as_mut() {
                    sink.write_all(&out).await?;
                    if tty {
                        sink.write_all(&err).await?;
                    }
                    sink.flush().await?;
                }
                if let Some(sink) = stderr.as_mut() {
                    sink.write_all(&err).await?;
                    sink.flush().await?;
                }
                Ok(ExitStatus::new(code))
            }
            Reply::Hang { stdout: out } => {
                if let Some(sink) = stdout.as_mut() {
                    sink.write_all(&out).await?;
                    sink.flush().await?;
                }
                futures::future::pending::<()>().await;
                Ok(ExitStatus::new(0))
            }
            Reply::Fail(message) => Err(TransportError::Stream(message)),
        }
    }
}

/// `stat -c` output for a regular file or directory.
pub fn stat_report(path: &str, size: u64, raw_mode_hex: &str, mtime: i64) -> String {
    let kind = if raw_mode_hex.starts_with('4') {
        "directory"
    } else {
        "regular file"
    };
    format!(
        "size: {}\nmode: {}\nmod: {}\ntype: {}\nname: {}\n",
        size, raw_mode_hex, mtime, kind, path
    )
}

pub fn target() -> TargetIdentity {
    TargetIdentity::new("default", "web-0", "app")
}

pub fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}
