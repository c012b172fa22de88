// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Attribute Codec
//!
//! Turns the text printed by `stat -c STAT_FORMAT <path>` into a
//! [`FileAttributes`] record, and translates raw POSIX mode words into the
//! portable [`FileMode`] the SFTP layer re-encodes for clients.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure decoding, no I/O

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `stat` format string used for every attribute lookup.
///
/// The name comes last so that names containing `": "` or newlines can be
/// taken verbatim up to the final newline.
pub const STAT_FORMAT: &str = "size: %s\nmode: %f\nmod: %Y\ntype: %F\nname: %n\n";

const S_IFMT: u32 = 0o170000;
const S_IFSOCK: u32 = 0o140000;
const S_IFLNK: u32 = 0o120000;
const S_IFREG: u32 = 0o100000;
const S_IFBLK: u32 = 0o060000;
const S_IFDIR: u32 = 0o040000;
const S_IFCHR: u32 = 0o020000;
const S_IFIFO: u32 = 0o010000;
const S_ISUID: u32 = 0o4000;
const S_ISGID: u32 = 0o2000;
const S_ISVTX: u32 = 0o1000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("stat output is missing key '{0}'")]
    MissingKey(&'static str),

    #[error("stat key '{key}' has invalid value '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    BlockDevice,
    CharDevice,
    Directory,
    NamedPipe,
    Symlink,
    Regular,
    Socket,
}

impl FileType {
    fn type_bits(self) -> u32 {
        match self {
            FileType::BlockDevice => S_IFBLK,
            FileType::CharDevice => S_IFCHR,
            FileType::Directory => S_IFDIR,
            FileType::NamedPipe => S_IFIFO,
            FileType::Symlink => S_IFLNK,
            FileType::Regular => S_IFREG,
            FileType::Socket => S_IFSOCK,
        }
    }

    fn symbol(self) -> char {
        match self {
            FileType::BlockDevice => 'b',
            FileType::CharDevice => 'c',
            FileType::Directory => 'd',
            FileType::NamedPipe => 'p',
            FileType::Symlink => 'l',
            FileType::Regular => '-',
            FileType::Socket => 's',
        }
    }
}

/// Portable mode: one file type, the permission bits and the special bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMode {
    pub file_type: FileType,
    /// Low nine permission bits (`rwxrwxrwx`).
    pub permissions: u32,
    pub setuid: bool,
    pub setgid: bool,
    pub sticky: bool,
}

impl FileMode {
    /// Decode a raw `st_mode` word. Unknown type encodings count as regular
    /// files, so the mapping is total.
    pub fn from_unix(mode: u32) -> Self {
        let file_type = match mode & S_IFMT {
            S_IFBLK => FileType::BlockDevice,
            S_IFCHR => FileType::CharDevice,
            S_IFDIR => FileType::Directory,
            S_IFIFO => FileType::NamedPipe,
            S_IFLNK => FileType::Symlink,
            S_IFSOCK => FileType::Socket,
            _ => FileType::Regular,
        };
        Self {
            file_type,
            permissions: mode & 0o777,
            setuid: mode & S_ISUID != 0,
            setgid: mode & S_ISGID != 0,
            sticky: mode & S_ISVTX != 0,
        }
    }

    /// Re-encode as a POSIX mode word, the form SFTP carries on the wire.
    pub fn to_unix(&self) -> u32 {
        let mut mode = self.file_type.type_bits() | self.permissions;
        if self.setuid {
            mode |= S_ISUID;
        }
        if self.setgid {
            mode |= S_ISGID;
        }
        if self.sticky {
            mode |= S_ISVTX;
        }
        mode
    }

    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    /// `ls -l` style rendering, e.g. `drwxr-sr-t`.
    pub fn symbolic(&self) -> String {
        let mut out = String::with_capacity(10);
        out.push(self.file_type.symbol());
        let triads = [
            (self.permissions >> 6, self.setuid, 's'),
            (self.permissions >> 3, self.setgid, 's'),
            (self.permissions, self.sticky, 't'),
        ];
        for (bits, special, special_char) in triads {
            out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            let exec = bits & 0o1 != 0;
            out.push(match (special, exec) {
                (true, true) => special_char,
                (true, false) => special_char.to_ascii_uppercase(),
                (false, true) => 'x',
                (false, false) => '-',
            });
        }
        out
    }
}

/// Attributes of one remote entry, resolved fresh for every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttributes {
    /// Base name of the entry.
    pub name: String,
    pub size: u64,
    pub mode: FileMode,
    /// Modification time, seconds since the Unix epoch.
    pub mtime: i64,
    pub is_dir: bool,
}

impl FileAttributes {
    /// `ls -l` style line used as the SFTP long name.
    pub fn long_name(&self) -> String {
        let modified = DateTime::from_timestamp(self.mtime, 0)
            .map(|t| t.format("%b %d %H:%M").to_string())
            .unwrap_or_else(|| "Jan 01 00:00".to_string());
        format!(
            "{} 1 0 0 {:>8} {} {}",
            self.mode.symbolic(),
            self.size,
            modified,
            self.name
        )
    }
}

/// Decode the output of `stat -c STAT_FORMAT <path>`.
pub fn decode_stat_report(report: &str) -> Result<FileAttributes, DecodeError> {
    let (head, raw_name) = match report.strip_prefix("name: ") {
        Some(name) => ("", name),
        None => report
            .split_once("\nname: ")
            .ok_or(DecodeError::MissingKey("name"))?,
    };
    let name = raw_name.strip_suffix('\n').unwrap_or(raw_name);

    let mut size = None;
    let mut mode = None;
    let mut modified = None;
    let mut entry_type = None;
    for line in head.lines() {
        let Some((key, value)) = line.split_once(": ") else {
            continue;
        };
        match key {
            "size" => size = Some(value),
            "mode" => mode = Some(value),
            "mod" => modified = Some(value),
            "type" => entry_type = Some(value),
            _ => {}
        }
    }

    let size = size.ok_or(DecodeError::MissingKey("size"))?;
    let size: u64 = size.trim().parse().map_err(|_| DecodeError::InvalidValue {
        key: "size",
        value: size.to_string(),
    })?;

    let mode = mode.ok_or(DecodeError::MissingKey("mode"))?;
    let raw_mode =
        u32::from_str_radix(mode.trim(), 16).map_err(|_| DecodeError::InvalidValue {
            key: "mode",
            value: mode.to_string(),
        })?;

    let modified = modified.ok_or(DecodeError::MissingKey("mod"))?;
    let mtime: i64 = modified
        .trim()
        .parse()
        .map_err(|_| DecodeError::InvalidValue {
            key: "mod",
            value: modified.to_string(),
        })?;

    let entry_type = entry_type.ok_or(DecodeError::MissingKey("type"))?;

    Ok(FileAttributes {
        name: base_name(name),
        size,
        mode: FileMode::from_unix(raw_mode),
        mtime,
        is_dir: entry_type.trim() == "directory",
    })
}

/// Last path element, with the same edge cases as POSIX `basename`.
fn base_name(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    match trimmed.rsplit_once('/') {
        Some((_, base)) => base.to_string(),
        None => trimmed.to_string(),
    }
}
