// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! SFTP subsystem adapter.
//!
//! Implements `russh_sftp::server::Handler` by converting wire packets into
//! translator calls. Handles are opaque UUID strings mapped to the read
//! spool, write sink or directory lister they were opened with. Each handle
//! owns a child token of the connection: closing the handle or losing the
//! connection cancels its in-flight commands and drops its spool.

use crate::application::file_translator::{FileOpError, FileOperationTranslator, ListerAt, RemoteFileWriter};
use crate::application::spool::SpooledFile;
use crate::domain::attributes::FileAttributes as RemoteAttributes;
use crate::domain::exec::ExecError;
use crate::domain::file_request::{FileCommand, OpenFlags, SetAttributes};
use russh_sftp::server::Handler;
use russh_sftp::protocol::{
    Attrs, Data, File, FileAttributes, Handle, Name, OpenFlags as WireOpenFlags, Status,
    StatusCode, Version,
};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Entries resolved per READDIR round trip.
pub const LIST_PAGE_SIZE: usize = 100;

/// Upper bound on a single READ reply.
const MAX_READ_LEN: u32 = 256 * 1024;

enum HandleKind {
    Read(SpooledFile),
    Write(RemoteFileWriter),
    Dir {
        lister: Box<dyn ListerAt>,
        offset: usize,
    },
}

struct OpenHandle {
    path: String,
    kind: HandleKind,
    cancel: CancellationToken,
}

pub struct SftpSession {
    translator: FileOperationTranslator,
    connection: CancellationToken,
    handles: HashMap<String, OpenHandle>,
}

impl SftpSession {
    pub fn new(translator: FileOperationTranslator, connection: CancellationToken) -> Self {
        Self {
            translator,
            connection,
            handles: HashMap::new(),
        }
    }

    fn register(&mut self, path: String, kind: HandleKind, cancel: CancellationToken) -> String {
        let handle = Uuid::new_v4().to_string();
        self.handles.insert(handle.clone(), OpenHandle { path, kind, cancel });
        handle
    }

    fn handle_path(&self, handle: &str) -> Result<String, StatusCode> {
        self.handles
            .get(handle)
            .map(|h| h.path.clone())
            .ok_or(StatusCode::NoSuchFile)
    }

    async fn apply_setstat(&self, path: &str, attrs: FileAttributes) -> Result<(), StatusCode> {
        let request = SetAttributes {
            size: attrs.size,
            mtime: attrs.mtime,
            permissions: attrs.permissions,
            uid_gid: attrs.uid.zip(attrs.gid),
        };
        if request.is_empty() {
            return Ok(());
        }
        self.translator
            .command(path, &FileCommand::Setstat(request), &self.connection)
            .await
            .map_err(|e| status_for("setstat", path, e))
    }
}

impl Drop for SftpSession {
    fn drop(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.cancel.cancel();
        }
    }
}

impl Handler for SftpSession {
    type Error = StatusCode;

    fn unimplemented(&self) -> Self::Error {
        StatusCode::OpUnsupported
    }

    async fn init(
        &mut self,
        version: u32,
        _extensions: HashMap<String, String>,
    ) -> Result<Version, Self::Error> {
        debug!("SFTP INIT: client version={}", version);
        Ok(Version::new())
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        pflags: WireOpenFlags,
        _attrs: FileAttributes,
    ) -> Result<Handle, Self::Error> {
        let path = normalize_path(&filename);
        let flags = open_flags(pflags);
        debug!("SFTP OPEN: path={}, flags={:?}", path, flags);

        let cancel = self.connection.child_token();
        let kind = if flags.wants_write() {
            let writer = self
                .translator
                .open_writer(&path, flags, &cancel)
                .await
                .map_err(|e| status_for("open", &path, e))?;
            HandleKind::Write(writer)
        } else {
            let spooled = self
                .translator
                .read(&path, &cancel)
                .await
                .map_err(|e| status_for("read", &path, e))?;
            HandleKind::Read(spooled)
        };

        let handle = self.register(path, kind, cancel);
        Ok(Handle { id, handle })
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        debug!("SFTP CLOSE: handle={}", handle);
        let open = self.handles.remove(&handle).ok_or(StatusCode::NoSuchFile)?;
        if let HandleKind::Read(spooled) = &open.kind {
            spooled.release().await;
        }
        open.cancel.cancel();
        Ok(ok_status(id))
    }

    async fn read(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        len: u32,
    ) -> Result<Data, Self::Error> {
        let open = self.handles.get(&handle).ok_or(StatusCode::NoSuchFile)?;
        let HandleKind::Read(spooled) = &open.kind else {
            return Err(StatusCode::OpUnsupported);
        };

        let mut data = vec![0u8; len.min(MAX_READ_LEN) as usize];
        let n = spooled.read_at(&mut data, offset).await.map_err(|e| {
            warn!("SFTP READ failed for {}: {}", open.path, e);
            StatusCode::Failure
        })?;
        if n == 0 && !data.is_empty() {
            return Err(StatusCode::Eof);
        }
        data.truncate(n);
        Ok(Data { id, data })
    }

    async fn write(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<Status, Self::Error> {
        let open = self.handles.get(&handle).ok_or(StatusCode::NoSuchFile)?;
        let HandleKind::Write(writer) = &open.kind else {
            return Err(StatusCode::OpUnsupported);
        };
        debug!("SFTP WRITE: path={}, offset={}, len={}", open.path, offset, data.len());

        writer
            .write_at(&data, offset)
            .await
            .map_err(|e| status_for("write", &open.path, e))?;
        Ok(ok_status(id))
    }

    async fn opendir(&mut self, id: u32, path: String) -> Result<Handle, Self::Error> {
        let path = normalize_path(&path);
        debug!("SFTP OPENDIR: path={}", path);

        let cancel = self.connection.child_token();
        let lister = self
            .translator
            .list(&path, &cancel)
            .await
            .map_err(|e| status_for("list", &path, e))?;

        let handle = self.register(path, HandleKind::Dir { lister, offset: 0 }, cancel);
        Ok(Handle { id, handle })
    }

    async fn readdir(&mut self, id: u32, handle: String) -> Result<Name, Self::Error> {
        let open = self.handles.get_mut(&handle).ok_or(StatusCode::NoSuchFile)?;
        let HandleKind::Dir { lister, offset } = &mut open.kind else {
            return Err(StatusCode::OpUnsupported);
        };

        let entries = lister
            .list_at(*offset, LIST_PAGE_SIZE)
            .await
            .map_err(|e| status_for("list", &open.path, e))?;
        if entries.is_empty() {
            return Err(StatusCode::Eof);
        }
        *offset += entries.len();

        let files = entries.iter().map(to_wire_file).collect();
        Ok(Name { id, files })
    }

    async fn stat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let path = normalize_path(&path);
        debug!("SFTP STAT: path={}", path);
        let attrs = self
            .translator
            .stat(&path, &self.connection)
            .await
            .map_err(|e| status_for("stat", &path, e))?;
        Ok(Attrs {
            id,
            attrs: to_wire_attributes(&attrs),
        })
    }

    async fn lstat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        self.stat(id, path).await
    }

    async fn fstat(&mut self, id: u32, handle: String) -> Result<Attrs, Self::Error> {
        let path = self.handle_path(&handle)?;
        self.stat(id, path).await
    }

    async fn setstat(
        &mut self,
        id: u32,
        path: String,
        attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        let path = normalize_path(&path);
        debug!("SFTP SETSTAT: path={}", path);
        self.apply_setstat(&path, attrs).await?;
        Ok(ok_status(id))
    }

    async fn fsetstat(
        &mut self,
        id: u32,
        handle: String,
        attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        let path = self.handle_path(&handle)?;
        debug!("SFTP FSETSTAT: path={}", path);
        self.apply_setstat(&path, attrs).await?;
        Ok(ok_status(id))
    }

    async fn mkdir(
        &mut self,
        id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        self.simple_command(id, &path, FileCommand::Mkdir).await
    }

    async fn remove(&mut self, id: u32, filename: String) -> Result<Status, Self::Error> {
        self.simple_command(id, &filename, FileCommand::Remove).await
    }

    async fn rmdir(&mut self, id: u32, path: String) -> Result<Status, Self::Error> {
        self.simple_command(id, &path, FileCommand::Rmdir).await
    }

    async fn realpath(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        let path = normalize_path(&path);
        debug!("SFTP REALPATH: path={}", path);
        Ok(Name {
            id,
            files: vec![File {
                filename: path.clone(),
                longname: path,
                attrs: FileAttributes::default(),
            }],
        })
    }
}

impl SftpSession {
    async fn simple_command(
        &self,
        id: u32,
        path: &str,
        command: FileCommand,
    ) -> Result<Status, StatusCode> {
        let path = normalize_path(path);
        debug!("SFTP {}: path={}", command.method().to_uppercase(), path);
        self.translator
            .command(&path, &command, &self.connection)
            .await
            .map_err(|e| status_for(command.method(), &path, e))?;
        Ok(ok_status(id))
    }
}

fn ok_status(id: u32) -> Status {
    Status {
        id,
        status_code: StatusCode::Ok,
        error_message: "Ok".to_string(),
        language_tag: "en-US".to_string(),
    }
}

fn status_for(operation: &str, path: &str, err: FileOpError) -> StatusCode {
    warn!("SFTP {} failed for {}: {}", operation, path, err);
    match &err {
        FileOpError::Unsupported(_) => StatusCode::OpUnsupported,
        FileOpError::Remote {
            source: ExecError::RemoteExit { stderr, .. },
            ..
        } => {
            if stderr.contains("No such file or directory") {
                StatusCode::NoSuchFile
            } else if stderr.contains("Permission denied") {
                StatusCode::PermissionDenied
            } else {
                StatusCode::Failure
            }
        }
        _ => StatusCode::Failure,
    }
}

fn open_flags(flags: WireOpenFlags) -> OpenFlags {
    OpenFlags {
        read: flags.contains(WireOpenFlags::READ),
        write: flags.contains(WireOpenFlags::WRITE),
        append: flags.contains(WireOpenFlags::APPEND),
        create: flags.contains(WireOpenFlags::CREATE),
        truncate: flags.contains(WireOpenFlags::TRUNCATE),
        exclusive: flags.contains(WireOpenFlags::EXCLUDE),
    }
}

fn to_wire_attributes(attrs: &RemoteAttributes) -> FileAttributes {
    let mtime = u32::try_from(attrs.mtime.max(0)).unwrap_or(u32::MAX);
    FileAttributes {
        size: Some(attrs.size),
        permissions: Some(attrs.mode.to_unix()),
        atime: Some(mtime),
        mtime: Some(mtime),
        ..Default::default()
    }
}

fn to_wire_file(attrs: &RemoteAttributes) -> File {
    File {
        filename: attrs.name.clone(),
        longname: attrs.long_name(),
        attrs: to_wire_attributes(attrs),
    }
}

/// Lexically normalize a client path into an absolute path.
///
/// Relative paths resolve against `/`; `..` never climbs above the root.
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}
