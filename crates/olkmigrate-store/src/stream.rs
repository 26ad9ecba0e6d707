//! COM `IStream` shaped access to Rust byte streams
//!
//! Mail store sessions read message content through [`ComStream`], the same
//! shape native mail libraries expect from an `IStream`. [`ManagedStream`]
//! adapts any seekable, resizable Rust stream to it.

use crate::{StoreError, StoreResult};
use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

pub const STREAM_SEEK_SET: i32 = 0x0;
pub const STREAM_SEEK_CUR: i32 = 0x1;
pub const STREAM_SEEK_END: i32 = 0x2;

/// `STGTY` values reported by [`ComStream::stat`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum StorageType {
    Storage = 1,
    Stream = 2,
    LockBytes = 3,
    Property = 4,
}

/// Access granted on a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
}

impl AccessMode {
    /// The matching `STGM` access bits
    pub fn stgm(self) -> i32 {
        match self {
            AccessMode::Read => 0x0000_0000,
            AccessMode::Write => 0x0000_0001,
            AccessMode::ReadWrite => 0x0000_0002,
        }
    }

    pub fn can_read(self) -> bool {
        matches!(self, AccessMode::Read | AccessMode::ReadWrite)
    }

    pub fn can_write(self) -> bool {
        matches!(self, AccessMode::Write | AccessMode::ReadWrite)
    }
}

/// Result of [`ComStream::stat`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamStat {
    pub storage_type: StorageType,
    /// Stream length in bytes
    pub size: u64,
    pub mode: AccessMode,
}

/// Byte stream with `IStream` semantics
///
/// Clone, copy, region locking and revert are not supported by default and
/// fail with [`StoreError::NotSupported`]. Commit does nothing.
pub trait ComStream {
    /// Read up to `buf.len()` bytes, returning how many were read
    fn read(&mut self, buf: &mut [u8]) -> StoreResult<usize>;

    /// Write the whole buffer, returning the number of bytes written
    fn write(&mut self, buf: &[u8]) -> StoreResult<usize>;

    /// Move the cursor; `origin` is one of the `STREAM_SEEK_*` constants
    fn seek(&mut self, offset: i64, origin: i32) -> StoreResult<u64>;

    fn set_size(&mut self, size: u64) -> StoreResult<()>;

    fn stat(&mut self) -> StoreResult<StreamStat>;

    fn commit(&mut self, _flags: i32) -> StoreResult<()> {
        Ok(())
    }

    fn revert(&mut self) -> StoreResult<()> {
        Err(StoreError::NotSupported("Revert"))
    }

    fn lock_region(&mut self, _offset: u64, _len: u64, _lock_type: i32) -> StoreResult<()> {
        Err(StoreError::NotSupported("LockRegion"))
    }

    fn unlock_region(&mut self, _offset: u64, _len: u64, _lock_type: i32) -> StoreResult<()> {
        Err(StoreError::NotSupported("UnlockRegion"))
    }

    fn clone_stream(&self) -> StoreResult<Box<dyn ComStream>> {
        Err(StoreError::NotSupported("Clone"))
    }

    fn copy_to(&mut self, _target: &mut dyn ComStream, _len: u64) -> StoreResult<(u64, u64)> {
        Err(StoreError::NotSupported("CopyTo"))
    }
}

/// Streams whose length can be changed in place
pub trait Resize {
    fn resize(&mut self, len: u64) -> io::Result<()>;
}

impl Resize for File {
    fn resize(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

impl Resize for Cursor<Vec<u8>> {
    fn resize(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(ErrorKind::InvalidInput, "stream size too large"))?;
        self.get_mut().resize(len, 0);
        Ok(())
    }
}

/// Wraps a Rust stream as a [`ComStream`]
pub struct ManagedStream<S> {
    inner: Option<S>,
    mode: AccessMode,
}

impl<S> ManagedStream<S> {
    pub fn new(inner: S, mode: AccessMode) -> Self {
        Self {
            inner: Some(inner),
            mode,
        }
    }

    /// Release the underlying stream; later calls fail with [`StoreError::ClosedStream`]
    pub fn close(&mut self) {
        self.inner = None;
    }

    pub fn into_inner(self) -> Option<S> {
        self.inner
    }

    fn inner(&mut self) -> StoreResult<&mut S> {
        self.inner.as_mut().ok_or(StoreError::ClosedStream)
    }
}

impl ManagedStream<File> {
    /// Open a file as a stream positioned at its start
    pub fn open_file(path: impl AsRef<Path>, create_new: bool, writable: bool) -> StoreResult<Self> {
        let mut options = OpenOptions::new();
        options.read(true).write(writable);
        if create_new {
            options.create(true).truncate(true);
        }

        let mut file = options.open(path)?;
        file.seek(SeekFrom::Start(0))?;

        let mode = if writable {
            AccessMode::ReadWrite
        } else {
            AccessMode::Read
        };
        Ok(Self::new(file, mode))
    }
}

impl<S: Read + Write + Seek + Resize> ComStream for ManagedStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> StoreResult<usize> {
        if !self.mode.can_read() {
            return Err(StoreError::NotSupported("Read"));
        }
        Ok(self.inner()?.read(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> StoreResult<usize> {
        if !self.mode.can_write() {
            return Err(StoreError::NotSupported("Write"));
        }
        // write_all either writes everything or fails
        self.inner()?.write_all(buf)?;
        Ok(buf.len())
    }

    fn seek(&mut self, offset: i64, origin: i32) -> StoreResult<u64> {
        let from = match origin {
            STREAM_SEEK_SET => {
                let start = u64::try_from(offset).map_err(|_| {
                    io::Error::new(ErrorKind::InvalidInput, "negative absolute seek position")
                })?;
                SeekFrom::Start(start)
            }
            STREAM_SEEK_CUR => SeekFrom::Current(offset),
            STREAM_SEEK_END => SeekFrom::End(offset),
            other => return Err(StoreError::InvalidSeekOrigin(other)),
        };
        Ok(self.inner()?.seek(from)?)
    }

    fn set_size(&mut self, size: u64) -> StoreResult<()> {
        Ok(self.inner()?.resize(size)?)
    }

    fn stat(&mut self) -> StoreResult<StreamStat> {
        let mode = self.mode;
        let inner = self.inner()?;
        let position = inner.stream_position()?;
        let size = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(position))?;

        Ok(StreamStat {
            storage_type: StorageType::Stream,
            size,
            mode,
        })
    }
}

/// Drain a stream from its current position
pub fn read_to_end(stream: &mut dyn ComStream) -> StoreResult<Vec<u8>> {
    let mut content = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        content.extend_from_slice(&chunk[..n]);
    }
    Ok(content)
}
