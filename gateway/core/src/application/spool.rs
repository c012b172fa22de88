// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Request-scoped spool files backing SFTP reads.
//!
//! A remote `cat` can only be streamed once, while SFTP clients read at
//! arbitrary offsets. The stream is spooled into a local temp file that
//! lives exactly as long as the read request: it is deleted when the
//! [`SpooledFile`] is dropped or released, and becomes unreadable as soon
//! as the request's cancellation token fires.

use std::io::{self, SeekFrom};
use std::path::Path;
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const SPOOL_PREFIX: &str = "podgate-spool-";

/// Spool being filled by a remote command.
pub(crate) struct Spool {
    file: File,
    path: TempPath,
}

impl Spool {
    /// Allocate a spool file in `dir`, or the system temp dir.
    pub(crate) fn create(dir: Option<&Path>) -> io::Result<Self> {
        let named = match dir {
            Some(dir) => tempfile::Builder::new().prefix(SPOOL_PREFIX).tempfile_in(dir)?,
            None => tempfile::Builder::new().prefix(SPOOL_PREFIX).tempfile()?,
        };
        let (file, path) = named.into_parts();
        Ok(Self {
            file: File::from_std(file),
            path,
        })
    }

    pub(crate) fn writer(&mut self) -> &mut File {
        &mut self.file
    }

    /// Seal the spool for random-access reads bound to `cancel`.
    pub(crate) async fn finish(mut self, cancel: CancellationToken) -> io::Result<SpooledFile> {
        self.file.flush().await?;
        let len = self.file.metadata().await?.len();
        Ok(SpooledFile {
            state: Mutex::new(Some(SpoolState {
                file: self.file,
                _path: self.path,
            })),
            len,
            cancel,
        })
    }
}

#[derive(Debug)]
struct SpoolState {
    file: File,
    // Deletes the file on drop.
    _path: TempPath,
}

/// Seekable byte source over a spooled remote file.
#[derive(Debug)]
pub struct SpooledFile {
    state: Mutex<Option<SpoolState>>,
    len: u64,
    cancel: CancellationToken,
}

impl SpooledFile {
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read up to `buf.len()` bytes starting at `offset`.
    ///
    /// Returns 0 at or past the end of the spool.
    pub async fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        if self.cancel.is_cancelled() {
            self.release().await;
            return Err(io::Error::new(
                io::ErrorKind::Interrupted,
                "read request cancelled",
            ));
        }
        if offset >= self.len {
            return Ok(0);
        }

        let mut state = self.state.lock().await;
        let Some(state) = state.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::NotFound, "spool released"));
        };

        state.file.seek(SeekFrom::Start(offset)).await?;
        let mut filled = 0;
        while filled < buf.len() {
            let n = state.file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    /// Delete the spool now instead of waiting for drop.
    pub async fn release(&self) {
        if self.state.lock().await.take().is_some() {
            debug!("Released read spool ({} bytes)", self.len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn spool_with(dir: &Path, content: &[u8], cancel: CancellationToken) -> SpooledFile {
        let mut spool = Spool::create(Some(dir)).unwrap();
        spool.writer().write_all(content).await.unwrap();
        spool.finish(cancel).await.unwrap()
    }

    fn spool_entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_random_access_reads() {
        let dir = tempfile::tempdir().unwrap();
        let spooled = spool_with(dir.path(), b"0123456789", CancellationToken::new()).await;
        assert_eq!(spooled.len(), 10);

        let mut buf = [0u8; 4];
        assert_eq!(spooled.read_at(&mut buf, 6).await.unwrap(), 4);
        assert_eq!(&buf, b"6789");
        assert_eq!(spooled.read_at(&mut buf, 2).await.unwrap(), 4);
        assert_eq!(&buf, b"2345");
        assert_eq!(spooled.read_at(&mut buf, 8).await.unwrap(), 2);
        assert_eq!(spooled.read_at(&mut buf, 10).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_drop_deletes_spool_file() {
        let dir = tempfile::tempdir().unwrap();
        let spooled = spool_with(dir.path(), b"abc", CancellationToken::new()).await;
        assert_eq!(spool_entries(dir.path()), 1);

        drop(spooled);
        assert_eq!(spool_entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_cancelled_request_releases_spool_on_access() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let spooled = spool_with(dir.path(), b"abc", cancel.clone()).await;

        cancel.cancel();
        let mut buf = [0u8; 3];
        let err = spooled.read_at(&mut buf, 0).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
        assert_eq!(spool_entries(dir.path()), 0);
    }
}
