// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Protocol-neutral shapes of file-transfer requests.
//!
//! The SFTP adapter converts wire packets into these before calling the
//! translator, so the translator never sees protocol types.

use serde::{Deserialize, Serialize};

/// Open flags relevant to remote writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub create: bool,
    pub truncate: bool,
    pub exclusive: bool,
}

impl OpenFlags {
    /// Whether the open produces a write sink rather than a read source.
    pub fn wants_write(&self) -> bool {
        self.write || self.append || self.create || self.truncate || self.exclusive
    }
}

/// Attributes a Setstat request asks to change. `None` means "leave as is".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetAttributes {
    pub size: Option<u64>,
    /// Modification time in seconds since the Unix epoch.
    pub mtime: Option<u32>,
    pub permissions: Option<u32>,
    pub uid_gid: Option<(u32, u32)>,
}

impl SetAttributes {
    pub fn is_empty(&self) -> bool {
        self.size.is_none()
            && self.mtime.is_none()
            && self.permissions.is_none()
            && self.uid_gid.is_none()
    }
}

/// Requests answered with plain success or failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileCommand {
    Setstat(SetAttributes),
    Mkdir,
    Remove,
    Rmdir,
    Rename { target: String },
    Symlink { target: String },
    Link { target: String },
}

impl FileCommand {
    pub fn method(&self) -> &'static str {
        match self {
            FileCommand::Setstat(_) => "Setstat",
            FileCommand::Mkdir => "Mkdir",
            FileCommand::Remove => "Remove",
            FileCommand::Rmdir => "Rmdir",
            FileCommand::Rename { .. } => "Rename",
            FileCommand::Symlink { .. } => "Symlink",
            FileCommand::Link { .. } => "Link",
        }
    }
}
