// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! File-Operation Translator
//!
//! Serves the file-transfer capability set {Read, Write, Command, List}
//! for a container that has no file API, only exec. Every primitive is a
//! fixed mapping onto one-shot commands:
//!
//! | Operation                | Remote command                                       |
//! |--------------------------|------------------------------------------------------|
//! | read                     | `cat <path>`                                         |
//! | open, truncate + create  | `truncate <path>`                                    |
//! | open, truncate only      | `truncate -c <path>`                                 |
//! | open, create only        | `touch <path>`                                       |
//! | write, append            | `dd bs=1 conv=nocreat oflag=append of=<path>`        |
//! | write, positional        | `dd bs=1 seek=<offset> conv=nocreat of=<path>`       |
//! | setstat size             | `truncate -c -s <size> <path>`                       |
//! | setstat mtime            | `touch -c -m -t <YYYYMMDDhhmm.ss> <path>`            |
//! | setstat permissions      | `chmod <octal> <path>`                               |
//! | setstat owner            | `chown <uid>:<gid> <path>`                           |
//! | mkdir / remove / rmdir   | `mkdir` / `rm` / `rmdir <path>`                      |
//! | stat                     | `stat -c STAT_FORMAT <path>`                         |
//! | list                     | `ls -1 <path>`, then one stat per entry, page by page |
//!
//! Nothing is retried and nothing is cached: a multi-step setstat stops at
//! the first failing step with the earlier steps already applied.
//!
//! `touch -t` reads its stamp in the container's local time zone, so the
//! stamp is rendered at the configured remote UTC offset (UTC unless set).
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Implements the SFTP handler roles on top of the command channel

use crate::application::command_channel::RemoteCommandChannel;
use crate::application::spool::{Spool, SpooledFile};
use crate::domain::attributes::{decode_stat_report, DecodeError, FileAttributes, STAT_FORMAT};
use crate::domain::exec::{ExecError, ExecRequest};
use crate::domain::file_request::{FileCommand, OpenFlags, SetAttributes};
use crate::domain::target::{CommandVector, TargetIdentity};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FileOpError {
    #[error("{operation} failed: {source}")]
    Remote {
        operation: &'static str,
        #[source]
        source: ExecError,
    },

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("failed to decode attributes of {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: DecodeError,
    },

    #[error("failed to allocate read spool: {0}")]
    Spool(#[source] std::io::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported {0}")]
    Unsupported(&'static str),
}

impl FileOpError {
    /// Attach the operation name when the failure carries remote stderr.
    fn from_exec(operation: &'static str, err: ExecError) -> Self {
        match err {
            ExecError::RemoteExit { .. } => FileOpError::Remote {
                operation,
                source: err,
            },
            other => FileOpError::Exec(other),
        }
    }
}

/// The single handler type behind every file-transfer request of a session.
#[derive(Clone)]
pub struct FileOperationTranslator {
    channel: RemoteCommandChannel,
    target: Arc<TargetIdentity>,
    spool_dir: Option<Arc<PathBuf>>,
    remote_offset: FixedOffset,
}

impl FileOperationTranslator {
    pub fn new(channel: RemoteCommandChannel, target: TargetIdentity) -> Self {
        Self {
            channel,
            target: Arc::new(target),
            spool_dir: None,
            remote_offset: Utc.fix(),
        }
    }

    /// Spool reads into `dir` instead of the system temp dir.
    pub fn with_spool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spool_dir = Some(Arc::new(dir.into()));
        self
    }

    /// UTC offset of the container's clock, used for `touch -t` stamps.
    pub fn with_remote_offset(mut self, offset: FixedOffset) -> Self {
        self.remote_offset = offset;
        self
    }

    pub fn target(&self) -> &TargetIdentity {
        &self.target
    }

    /// Read: stream `cat <path>` into a request-scoped spool.
    ///
    /// The spool is allocated before any remote command is issued and is
    /// deleted if the command fails or `cancel` fires first.
    pub async fn read(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<SpooledFile, FileOpError> {
        debug!("Fileread: path={}", path);
        let mut spool = Spool::create(self.spool_dir.as_deref().map(PathBuf::as_path))
            .map_err(FileOpError::Spool)?;

        let command = CommandVector::new(["cat", path]);
        let request = ExecRequest::new(&self.target, &command).stdout(spool.writer());
        self.channel
            .execute(request, cancel)
            .await
            .map_err(|e| FileOpError::from_exec("read", e))?;

        spool.finish(cancel.clone()).await.map_err(FileOpError::Spool)
    }

    /// Write: prepare the file according to `flags`, then hand back a sink
    /// that issues one `dd` per write call.
    pub async fn open_writer(
        &self,
        path: &str,
        flags: OpenFlags,
        cancel: &CancellationToken,
    ) -> Result<RemoteFileWriter, FileOpError> {
        debug!("Filewrite: path={} flags={:?}", path, flags);
        let create = flags.create || flags.exclusive;
        let prepare = match (flags.truncate, create) {
            (true, true) => Some(CommandVector::new(["truncate", path])),
            (true, false) => Some(CommandVector::new(["truncate", "-c", path])),
            (false, true) => Some(CommandVector::new(["touch", path])),
            (false, false) => None,
        };
        if let Some(command) = prepare {
            self.run("open", &command, cancel).await?;
        }

        Ok(RemoteFileWriter {
            translator: self.clone(),
            path: path.to_string(),
            append: flags.append,
            cancel: cancel.clone(),
        })
    }

    /// Command: requests answered with plain success or failure.
    pub async fn command(
        &self,
        path: &str,
        command: &FileCommand,
        cancel: &CancellationToken,
    ) -> Result<(), FileOpError> {
        debug!("Filecmd: method={} path={}", command.method(), path);
        match command {
            FileCommand::Setstat(attrs) => self.setstat(path, attrs, cancel).await,
            FileCommand::Mkdir => {
                self.run("mkdir", &CommandVector::new(["mkdir", path]), cancel)
                    .await
            }
            FileCommand::Remove => self.run("remove", &CommandVector::new(["rm", path]), cancel).await,
            FileCommand::Rmdir => {
                self.run("rmdir", &CommandVector::new(["rmdir", path]), cancel)
                    .await
            }
            other => Err(FileOpError::Unsupported(other.method())),
        }
    }

    async fn setstat(
        &self,
        path: &str,
        attrs: &SetAttributes,
        cancel: &CancellationToken,
    ) -> Result<(), FileOpError> {
        if let Some(size) = attrs.size {
            let size = size.to_string();
            self.run(
                "setstat",
                &CommandVector::new(["truncate", "-c", "-s", size.as_str(), path]),
                cancel,
            )
            .await?;
        }

        if let Some(mtime) = attrs.mtime {
            let stamp = DateTime::from_timestamp(i64::from(mtime), 0)
                .ok_or_else(|| FileOpError::InvalidArgument(format!("mtime {}", mtime)))?
                .with_timezone(&self.remote_offset)
                .format("%Y%m%d%H%M.%S")
                .to_string();
            self.run(
                "setstat",
                &CommandVector::new(["touch", "-c", "-m", "-t", stamp.as_str(), path]),
                cancel,
            )
            .await?;
        }

        if let Some(permissions) = attrs.permissions {
            // Clients may send the full st_mode; chmod only takes the low bits.
            let mode = format!("{:o}", permissions & 0o7777);
            self.run(
                "setstat",
                &CommandVector::new(["chmod", mode.as_str(), path]),
                cancel,
            )
            .await?;
        }

        if let Some((uid, gid)) = attrs.uid_gid {
            let owner = format!("{}:{}", uid, gid);
            self.run(
                "setstat",
                &CommandVector::new(["chown", owner.as_str(), path]),
                cancel,
            )
            .await?;
        }

        Ok(())
    }

    /// Stat: one fresh `stat` round trip, decoded by the attribute codec.
    pub async fn stat(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<FileAttributes, FileOpError> {
        let output = self
            .capture("stat", &CommandVector::new(["stat", "-c", STAT_FORMAT, path]), cancel)
            .await?;
        let report = String::from_utf8_lossy(&output);
        decode_stat_report(&report).map_err(|source| FileOpError::Decode {
            path: path.to_string(),
            source,
        })
    }

    /// List: a file target yields its own stat; a directory yields a lister
    /// that resolves entry attributes page by page.
    pub async fn list(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn ListerAt>, FileOpError> {
        debug!("Filelist: path={}", path);
        let entry = self.stat(path, cancel).await?;
        if !entry.is_dir {
            return Ok(Box::new(SingleEntryLister { entry }));
        }

        let output = self
            .capture("list", &CommandVector::new(["ls", "-1", path]), cancel)
            .await?;
        let names = String::from_utf8_lossy(&output)
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Box::new(DirectoryLister {
            translator: self.clone(),
            dir: path.to_string(),
            names,
            cancel: cancel.clone(),
        }))
    }

    async fn run(
        &self,
        operation: &'static str,
        command: &CommandVector,
        cancel: &CancellationToken,
    ) -> Result<(), FileOpError> {
        self.channel
            .execute(ExecRequest::new(&self.target, command), cancel)
            .await
            .map_err(|e| FileOpError::from_exec(operation, e))
    }

    async fn capture(
        &self,
        operation: &'static str,
        command: &CommandVector,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, FileOpError> {
        let mut output = Vec::new();
        let request = ExecRequest::new(&self.target, command).stdout(&mut output);
        self.channel
            .execute(request, cancel)
            .await
            .map_err(|e| FileOpError::from_exec(operation, e))?;
        Ok(output)
    }
}

/// Random-access sink returned by [`FileOperationTranslator::open_writer`].
///
/// Each call is an independent `dd` invocation; calls are neither buffered
/// nor serialized.
pub struct RemoteFileWriter {
    translator: FileOperationTranslator,
    path: String,
    append: bool,
    cancel: CancellationToken,
}

impl RemoteFileWriter {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Write `data` at `offset`. Append-mode writers ignore `offset` and
    /// always target end of file.
    pub async fn write_at(&self, data: &[u8], offset: u64) -> Result<usize, FileOpError> {
        let output = format!("of={}", self.path);
        let command = if self.append {
            CommandVector::new(["dd", "bs=1", "conv=nocreat", "oflag=append", output.as_str()])
        } else {
            let seek = format!("seek={}", offset);
            CommandVector::new(["dd", "bs=1", seek.as_str(), "conv=nocreat", output.as_str()])
        };

        let request = ExecRequest::new(&self.translator.target, &command).stdin(data);
        self.translator
            .channel
            .execute(request, &self.cancel)
            .await
            .map_err(|e| FileOpError::from_exec("write", e))?;
        Ok(data.len())
    }
}

/// Paged entry lister handed to the file-transfer server.
#[async_trait]
pub trait ListerAt: Send + Sync {
    /// Resolve up to `max` entries starting at `offset`. An empty page
    /// marks the end of the listing.
    async fn list_at(&self, offset: usize, max: usize) -> Result<Vec<FileAttributes>, FileOpError>;
}

/// Listing of a non-directory target: exactly its own attributes.
pub struct SingleEntryLister {
    entry: FileAttributes,
}

#[async_trait]
impl ListerAt for SingleEntryLister {
    async fn list_at(&self, offset: usize, max: usize) -> Result<Vec<FileAttributes>, FileOpError> {
        if offset > 0 || max == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![self.entry.clone()])
    }
}

/// Directory listing: names are enumerated up front, attributes are
/// resolved with one stat per entry only when their page is requested.
pub struct DirectoryLister {
    translator: FileOperationTranslator,
    dir: String,
    names: Vec<String>,
    cancel: CancellationToken,
}

impl DirectoryLister {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[async_trait]
impl ListerAt for DirectoryLister {
    async fn list_at(&self, offset: usize, max: usize) -> Result<Vec<FileAttributes>, FileOpError> {
        let page = self.names.iter().skip(offset).take(max);
        let mut entries = Vec::with_capacity(max.min(self.names.len().saturating_sub(offset)));
        for name in page {
            let path = join_remote_path(&self.dir, name);
            entries.push(self.translator.stat(&path, &self.cancel).await?);
        }
        Ok(entries)
    }
}

/// Join a directory and an entry name the way POSIX paths compose.
pub fn join_remote_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_remote_path() {
        assert_eq!(join_remote_path("/", "etc"), "/etc");
        assert_eq!(join_remote_path("/var/log", "syslog"), "/var/log/syslog");
        assert_eq!(join_remote_path("/var/log/", "syslog"), "/var/log/syslog");
        assert_eq!(join_remote_path("", "a"), "a");
    }
}
